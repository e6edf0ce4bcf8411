//! Error types for hub operations.

use crate::{CallId, ParticipantId, RoomId, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-level error classification sent back in `ack` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    RoomNotFound,
    ParticipantNotFound,
    CallAlreadyActive,
    CallNotFound,
    CallEnded,
    ProvisioningFailed,
    TransportClosed,
    Internal,
}

impl ErrorKind {
    /// Returns the stable string label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoomNotFound => "RoomNotFound",
            Self::ParticipantNotFound => "ParticipantNotFound",
            Self::CallAlreadyActive => "CallAlreadyActive",
            Self::CallNotFound => "CallNotFound",
            Self::CallEnded => "CallEnded",
            Self::ProvisioningFailed => "ProvisioningFailed",
            Self::TransportClosed => "TransportClosed",
            Self::Internal => "Internal",
        }
    }
}

/// Errors that can occur while handling hub operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    #[error("a call is already in progress in room {0}")]
    CallAlreadyActive(RoomId),

    #[error("call not found: {0}")]
    CallNotFound(CallId),

    #[error("call has ended: {0}")]
    CallEnded(CallId),

    /// Non-fatal: the call proceeds without a join URL.
    #[error("call room provisioning failed: {0}")]
    ProvisioningFailed(String),

    /// Triggers session cleanup; never reported to a client.
    #[error("transport closed for session {0}")]
    TransportClosed(SessionId),

    /// An internal invariant was violated (for example a poisoned lock).
    #[error("internal hub error: {0}")]
    Internal(String),
}

impl HubError {
    /// Returns the wire classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoomNotFound(_) => ErrorKind::RoomNotFound,
            Self::ParticipantNotFound(_) => ErrorKind::ParticipantNotFound,
            Self::CallAlreadyActive(_) => ErrorKind::CallAlreadyActive,
            Self::CallNotFound(_) => ErrorKind::CallNotFound,
            Self::CallEnded(_) => ErrorKind::CallEnded,
            Self::ProvisioningFailed(_) => ErrorKind::ProvisioningFailed,
            Self::TransportClosed(_) => ErrorKind::TransportClosed,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_as_variant_name() {
        let err = HubError::CallAlreadyActive(RoomId::from("r1"));
        let json = serde_json::to_value(err.kind()).expect("serialize kind");
        assert_eq!(json, serde_json::json!("CallAlreadyActive"));
        assert_eq!(err.kind().as_str(), "CallAlreadyActive");
        assert_eq!(err.to_string(), "a call is already in progress in room r1");
    }
}
