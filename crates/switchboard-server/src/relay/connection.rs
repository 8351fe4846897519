//! Per-connection handle shared by the registry, dispatcher, and connection tasks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use switchboard_core::{CloseReason, ConnectionId, Origin};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::errors::SendError;

/// A live client connection.
///
/// Closing is latched: the first [`close`](Self::close) wins the reason and
/// cancels the close token; every later call is a no-op. Finalization has its
/// own latch so teardown runs exactly once.
pub struct ClientConnection {
    id: ConnectionId,
    origin: Arc<Origin>,
    /// Send channel to the connection's writer task.
    tx: mpsc::Sender<Arc<str>>,
    close_token: CancellationToken,
    close_reason: OnceLock<CloseReason>,
    finalized: AtomicBool,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    /// When the last pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full queue.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new open connection.
    pub fn new(id: ConnectionId, origin: Arc<Origin>, tx: mpsc::Sender<Arc<str>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            origin,
            tx,
            close_token: CancellationToken::new(),
            close_reason: OnceLock::new(),
            finalized: AtomicBool::new(false),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection identity.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Origin metadata captured at handshake.
    pub fn origin(&self) -> &Arc<Origin> {
        &self.origin
    }

    /// Queue a text frame for the writer without blocking.
    pub fn send(&self, message: Arc<str>) -> Result<(), SendError> {
        if self.is_closing() {
            return Err(SendError::SendAfterClose(self.id.clone()));
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(SendError::QueueFull(self.id.clone()))
            }
            Err(TrySendError::Closed(_)) => Err(SendError::SendAfterClose(self.id.clone())),
        }
    }

    /// Begin closing. Returns `true` only for the call that latched `reason`.
    pub fn close(&self, reason: CloseReason) -> bool {
        let first = self.close_reason.set(reason).is_ok();
        self.close_token.cancel();
        first
    }

    /// The latched close reason, if closing has begun.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closing(&self) -> bool {
        self.close_token.is_cancelled()
    }

    /// Resolves once closing has begun.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close_token.cancelled()
    }

    /// Claim teardown. Returns `true` for exactly one caller.
    pub fn mark_finalized(&self) -> bool {
        !self.finalized.swap(true, Ordering::AcqRel)
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or data received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let origin = Arc::new(Origin::parse("ws", "localhost:8080", "/"));
        (ClientConnection::new("conn_1".into(), origin, tx), rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection(8);
        assert_eq!(conn.id().as_str(), "conn_1");
        assert_eq!(conn.origin().hostname, "localhost");
        assert!(!conn.is_closing());
        assert!(conn.close_reason().is_none());
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection(8);
        conn.send(Arc::from("hello")).unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[test]
    fn send_to_full_queue_is_counted() {
        let (conn, _rx) = make_connection(1);
        conn.send(Arc::from("msg1")).unwrap();
        assert_matches!(conn.send(Arc::from("msg2")), Err(SendError::QueueFull(_)));
        assert_matches!(conn.send(Arc::from("msg3")), Err(SendError::QueueFull(_)));
        assert_eq!(conn.drop_count(), 2);
    }

    #[test]
    fn send_after_writer_gone() {
        let (conn, rx) = make_connection(8);
        drop(rx);
        assert_matches!(conn.send(Arc::from("x")), Err(SendError::SendAfterClose(_)));
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn send_after_close_is_rejected() {
        let (conn, mut rx) = make_connection(8);
        let _ = conn.close(CloseReason::Remote);
        assert_matches!(conn.send(Arc::from("late")), Err(SendError::SendAfterClose(id)) if id.as_str() == "conn_1");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn first_close_reason_wins() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.close(CloseReason::LocalRequested));
        assert!(!conn.close(CloseReason::Remote));
        assert!(!conn.close(CloseReason::Shutdown));
        assert_eq!(conn.close_reason(), Some(CloseReason::LocalRequested));
        assert!(conn.is_closing());
    }

    #[test]
    fn concurrent_close_latches_once() {
        let (conn, _rx) = make_connection(8);
        let conn = Arc::new(conn);
        let reasons = [
            CloseReason::Remote,
            CloseReason::LocalRequested,
            CloseReason::TimedOut,
            CloseReason::Shutdown,
        ];
        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = reasons
                .iter()
                .map(|&reason| {
                    let conn = &conn;
                    s.spawn(move || usize::from(conn.close(reason)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
        assert!(conn.close_reason().is_some());
    }

    #[tokio::test]
    async fn closed_future_resolves_after_close() {
        let (conn, _rx) = make_connection(8);
        let conn = Arc::new(conn);
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };
        let _ = conn.close(CloseReason::TimedOut);
        waiter.await.unwrap();
    }

    #[test]
    fn finalize_latch_claims_once() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.mark_finalized());
        assert!(!conn.mark_finalized());
    }

    #[test]
    fn check_alive_resets_flag() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn last_pong_elapsed_is_small_after_mark() {
        let (conn, _rx) = make_connection(8);
        conn.mark_alive();
        assert!(conn.last_pong_elapsed() < Duration::from_secs(1));
        assert!(conn.age() < Duration::from_secs(5));
    }
}
