//! Room-scoped signaling hub for VaporLink.
//!
//! Tracks which connections are bound to which room, fans chat, presence,
//! typing and call events out to the sessions of a room, and runs the
//! per-room call state machine (at most one live call per room).
//!
//! The hub is transport independent: a connection is an [`EventSender`]
//! attached through [`Hub::connect`]; inbound frames are handed to
//! [`Hub::dispatch`] and the connection is torn down with
//! [`Hub::disconnect`]. Room and participant records come from a
//! [`ParticipantDirectory`]; external call rooms from a
//! [`CallRoomProvisioner`].

pub mod calls;
pub mod config;
pub mod directory;
pub mod hub;
mod lock;
pub mod presence;
pub mod provision;
pub mod registry;
mod router;
mod session;
mod signaling;

pub use calls::{Call, CallParticipant, CallStateMachine, MAX_ENDED_CALLS_PER_ROOM};
pub use config::HubConfig;
pub use directory::{MemoryDirectory, ParticipantDirectory};
pub use hub::{Hub, RoomStatus};
pub use presence::{PresenceRecord, PresenceTracker};
pub use provision::{CallRoomProvisioner, DisabledProvisioner, ProvisionFuture};
pub use registry::{EventReceiver, EventSender, RoomRegistry, SessionBinding};
