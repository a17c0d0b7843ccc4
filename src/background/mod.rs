//! Background maintenance tasks.
//!
//! Browsers never announce that a chat tab was closed, so sessions end when
//! they have been idle for the configured lifetime.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::session::SessionStore;

/// Upper bound on how often the reaper wakes up.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawns a task that periodically ends sessions idle for longer than `ttl`.
///
/// The task runs until aborted via the returned handle.
///
/// # Arguments
///
/// * `store` - The shared session store to sweep.
/// * `ttl` - How long a session may sit untouched before it is dropped.
pub fn spawn_session_reaper(store: SessionStore, ttl: Duration) -> JoinHandle<()> {
    let period = sweep_interval(ttl);
    tracing::debug!(?ttl, ?period, "session reaper started");

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.reap_idle(ttl);
        }
    })
}

/// Sweeps at a quarter of the lifetime, between 1 ms and one minute.
fn sweep_interval(ttl: Duration) -> Duration {
    (ttl / 4).clamp(Duration::from_millis(1), MAX_SWEEP_INTERVAL)
}
