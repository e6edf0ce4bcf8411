//! Hub tuning knobs.

use std::time::Duration;

/// Default presence liveness window.
pub const DEFAULT_PRESENCE_WINDOW: Duration = Duration::from_secs(45);

/// Default per-session outbound queue depth.
pub const DEFAULT_SESSION_QUEUE_CAPACITY: usize = 256;

/// Runtime configuration for a [`crate::Hub`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// A participant counts as online while `now - last_seen` is below this window.
    pub presence_window: Duration,
    /// Capacity of the bounded queue between the hub and each connection writer.
    /// Events beyond it are dropped for that session only.
    pub session_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            presence_window: DEFAULT_PRESENCE_WINDOW,
            session_queue_capacity: DEFAULT_SESSION_QUEUE_CAPACITY,
        }
    }
}
