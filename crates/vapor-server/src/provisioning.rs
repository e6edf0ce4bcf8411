//! Bridges the hub's provisioning seam to the call-room provider client.

use std::sync::Arc;
use vapor_hub::{CallRoomProvisioner, ProvisionFuture};
use vapor_types::{CallId, HubError};
use vapor_voice::CallRoomService;

/// Provisions call rooms through the provider REST API.
#[derive(Debug, Clone)]
pub struct DailyProvisioner {
    service: Arc<CallRoomService>,
}

impl DailyProvisioner {
    pub fn new(service: CallRoomService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

impl CallRoomProvisioner for DailyProvisioner {
    fn provision(&self, call_id: &CallId) -> ProvisionFuture {
        let service = Arc::clone(&self.service);
        let call_id = call_id.clone();
        Box::pin(async move {
            let room = service
                .create_room(&call_id)
                .await
                .map_err(|e| HubError::ProvisioningFailed(e.to_string()))?;
            tracing::info!(call_id = %call_id, room = %room.name, "call room provisioned");
            Ok(room.url)
        })
    }

    fn is_enabled(&self) -> bool {
        self.service.is_enabled()
    }
}
