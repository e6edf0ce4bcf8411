//! Call-room provisioning for VaporLink.
//!
//! Calls are signaled by the hub, but media flows through an external
//! provider. This crate creates one short-lived Daily.co room per call
//! through the provider's REST API and hands its join URL back to the hub.
//!
//! Provisioning is best effort: when no API key is configured the service
//! reports itself disabled and calls proceed without a URL.

pub mod config;
pub mod error;
pub mod service;

pub use config::{DailyConfig, DEFAULT_DAILY_API_URL};
pub use error::VoiceError;
pub use service::{CallRoom, CallRoomService, CreateRoomRequest};
