//! Heartbeat liveness monitoring.
//!
//! The writer sends the pings; this loop only watches the alive flag that
//! inbound pongs (and any other inbound frame) refresh.

use std::sync::Arc;
use std::time::Duration;

use switchboard_core::CloseReason;
use tokio::time::{self, Instant};
use tracing::info;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding; the connection was closed with
    /// [`CloseReason::TimedOut`] (unless another reason latched first).
    TimedOut,
    /// The connection closed for some other reason.
    Cancelled,
}

/// Watch a connection until it closes or stops answering.
///
/// At each `interval` tick the alive flag is checked and reset. After
/// `timeout / interval` consecutive misses (at least 1) the connection is
/// closed as timed out.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
) -> HeartbeatResult {
    let mut check_interval = time::interval_at(Instant::now() + interval, interval);
    let mut missed_pongs: u32 = 0;
    let max_missed = max_missed(interval, timeout);

    loop {
        tokio::select! {
            () = connection.closed() => return HeartbeatResult::Cancelled,
            _ = check_interval.tick() => {
                if connection.check_alive() {
                    missed_pongs = 0;
                    continue;
                }
                missed_pongs += 1;
                if missed_pongs >= max_missed {
                    info!(
                        conn_id = %connection.id(),
                        silent_ms = u64::try_from(connection.last_pong_elapsed().as_millis()).unwrap_or(u64::MAX),
                        "heartbeat timed out"
                    );
                    let _ = connection.close(CloseReason::TimedOut);
                    return HeartbeatResult::TimedOut;
                }
            }
        }
    }
}

fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}
