//! Seam for external call-room provisioning.

use futures_util::future::BoxFuture;
use vapor_types::{CallId, HubError};

/// Future resolving to the provisioned call-room URL.
pub type ProvisionFuture = BoxFuture<'static, Result<String, HubError>>;

/// Creates an external media room for a call and returns its join URL.
///
/// Provisioning runs off the hub's hot path: `call:start` never waits on it.
pub trait CallRoomProvisioner: Send + Sync {
    fn provision(&self, call_id: &CallId) -> ProvisionFuture;

    /// Returns `false` when provisioning is switched off and should not be attempted.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Provisioner used when no media provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledProvisioner;

impl CallRoomProvisioner for DisabledProvisioner {
    fn provision(&self, _call_id: &CallId) -> ProvisionFuture {
        Box::pin(async {
            Err(HubError::ProvisioningFailed(
                "call room provisioning is not configured".to_string(),
            ))
        })
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
