//! Background tasks for the VaporLink server.
//!
//! Includes:
//! - Sweeping participants whose heartbeats stopped to offline.

use tokio::time::{sleep, Duration};
use vapor_hub::Hub;

/// Starts the presence sweep task.
///
/// Runs indefinitely, flipping participants that have been silent for longer
/// than the presence window to offline and broadcasting the change.
pub async fn start_presence_sweep_task(hub: Hub, interval_secs: u64) {
    if interval_secs == 0 {
        tracing::warn!("presence sweep disabled (interval=0)");
        return;
    }

    let interval = Duration::from_secs(interval_secs);
    tracing::info!(
        interval_secs,
        window_secs = hub.config().presence_window.as_secs(),
        "starting presence sweep task"
    );

    loop {
        sleep(interval).await;

        let flipped = hub.sweep_presence();
        if flipped > 0 {
            tracing::info!(count = flipped, "marked silent participants offline");
        }
    }
}
