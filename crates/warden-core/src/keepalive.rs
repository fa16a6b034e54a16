//! Periodic relay refresh.
//!
//! The relay tears a channel down after a period of inactivity. A
//! background task refreshes it on a fixed interval until cancelled.
//! Cancellation also abandons a refresh that is still in progress.
//! Failures are logged and counted; the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collaborators::EventChannel;

/// Refresh counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeepAliveStats {
    /// Successful refreshes.
    pub refreshed: u64,
    /// Failed refreshes.
    pub failed: u64,
}

/// Spawns the refresh loop. The first refresh happens one `period` in.
pub fn spawn_keepalive(
    channel: Arc<dyn EventChannel>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<KeepAliveStats> {
    tokio::spawn(async move {
        let mut stats = KeepAliveStats::default();
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticks.tick() => {}
            }

            // A stalled refresh must not hold up shutdown.
            let refreshed = tokio::select! {
                () = shutdown.cancelled() => break,
                refreshed = channel.keep_alive() => refreshed,
            };
            match refreshed {
                Ok(()) => {
                    stats.refreshed += 1;
                    debug!("relay channel refreshed");
                }
                Err(error) => {
                    stats.failed += 1;
                    warn!(error = %error, "relay refresh failed");
                }
            }
        }

        debug!(?stats, "keepalive stopped");
        stats
    })
}
