//! Shared types, error definitions, and the wire event catalogue for the
//! VaporLink hub.
//!
//! This crate provides the foundational types used across all VaporLink
//! crates: strongly typed identifiers, call and call-participant status
//! enums with their allowed transitions, participant profiles, the
//! inbound/outbound event enums exchanged with clients, and the hub error
//! type (via `thiserror`).
//!
//! No crate in the workspace depends on anything *except* `vapor-types` for
//! cross-cutting type definitions.

pub mod error;
pub mod events;

pub use error::{ErrorKind, HubError};
pub use events::{
    decode_client_frame, Ack, CallPeer, ClientFrame, InboundEvent, OutboundEvent, Reaction,
    ReactionRef, Reply, TypingIndicator,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a chat room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

/// Identifier of a participant within a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

/// Identifier of a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    /// Generates a fresh random call identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Opaque identifier assigned to a transport connection when it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generates a fresh random session identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Room-level status of a call.
///
/// Calls only move forward: `Ringing -> Active -> Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Created, initiator not yet attached.
    Ringing,
    /// At least one participant has joined.
    Active,
    /// Every joined participant has left.
    Ended,
}

impl CallStatus {
    /// Returns `true` if moving from `self` to `next` is a forward transition.
    pub fn can_transition_to(self, next: CallStatus) -> bool {
        matches!(
            (self, next),
            (Self::Ringing, Self::Active) | (Self::Ringing, Self::Ended) | (Self::Active, Self::Ended)
        )
    }

    /// Returns `true` for any status other than `Ended`.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Ended)
    }
}

/// Status of a participant's membership within one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallParticipantStatus {
    /// Invited, waiting for an answer.
    Ringing,
    /// Refused the invitation.
    Declined,
    /// Currently in the call.
    Joined,
    /// Was in the call and left.
    Left,
}

impl CallParticipantStatus {
    /// Returns `true` if `self -> next` is allowed as an in-place transition.
    ///
    /// A terminal row (`Declined` or `Left`) never transitions again; a
    /// `call:join` replaces it with a fresh `Joined` row instead.
    pub fn can_transition_to(self, next: CallParticipantStatus) -> bool {
        matches!(
            (self, next),
            (Self::Ringing, Self::Declined) | (Self::Ringing, Self::Joined) | (Self::Joined, Self::Left)
        )
    }

    /// Returns `true` for `Declined` and `Left`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Left)
    }
}

/// Directory view of a participant: who they are and which room they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    pub id: ParticipantId,
    pub room_id: RoomId,
    pub display_name: String,
    pub avatar: String,
}

/// Participant object broadcast with `participant:join` and `participant:update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantPresence {
    pub id: ParticipantId,
    pub room_id: RoomId,
    pub display_name: String,
    pub avatar: String,
    pub is_online: bool,
    pub last_seen_at: DateTime<Utc>,
}

impl ParticipantPresence {
    /// Combines a directory profile with the tracker's presence state.
    pub fn new(profile: ParticipantProfile, is_online: bool, last_seen_at: DateTime<Utc>) -> Self {
        Self {
            id: profile.id,
            room_id: profile.room_id,
            display_name: profile.display_name,
            avatar: profile.avatar,
            is_online,
            last_seen_at,
        }
    }
}
