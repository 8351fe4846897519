//! Transport-agnostic frame pump and writer.
//!
//! The relay speaks [`Frame`] over any `Stream`/`Sink` pair; the HTTP gateway
//! converts to and from its own message type at the edge, and tests plug in
//! in-memory channels.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use switchboard_core::CloseReason;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use super::connection::ClientConnection;
use crate::errors::TransportError;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (shutdown, idle timeout).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Protocol error.
pub const CLOSE_PROTOCOL: u16 = 1002;
/// Unexpected server condition.
pub const CLOSE_INTERNAL: u16 = 1011;

/// A WebSocket frame as seen by the relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text data.
    Text(String),
    /// Binary data.
    Binary(Vec<u8>),
    /// Ping control frame.
    Ping(Vec<u8>),
    /// Pong control frame.
    Pong(Vec<u8>),
    /// Close control frame with optional code and reason.
    Close(Option<CloseFrame>),
}

/// Close frame payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close status code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseFrame {
    /// Build a close frame.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Close frame the relay sends for a latched reason. Remote closes are
/// already acknowledged by the transport, so they get none.
pub fn close_frame_for(reason: CloseReason) -> Option<CloseFrame> {
    let code = match reason {
        CloseReason::Remote => return None,
        CloseReason::LocalRequested => CLOSE_NORMAL,
        CloseReason::Shutdown | CloseReason::TimedOut => CLOSE_GOING_AWAY,
        CloseReason::ProtocolError => CLOSE_PROTOCOL,
    };
    Some(CloseFrame::new(code, reason.as_str()))
}

/// One step of inbound traffic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A complete data frame.
    Payload(Vec<u8>),
    /// The connection closed with this latched reason. Yielded once.
    Closed(CloseReason),
}

/// Reads frames for one connection in arrival order.
pub struct InboundPump<St> {
    stream: St,
    connection: Arc<ClientConnection>,
}

impl<St> InboundPump<St>
where
    St: Stream<Item = Result<Frame, TransportError>> + Unpin,
{
    /// Wrap a frame stream.
    pub fn new(stream: St, connection: Arc<ClientConnection>) -> Self {
        Self { stream, connection }
    }

    /// Next data payload, or the close that ended the connection.
    ///
    /// A close triggered anywhere else (engine, heartbeat, shutdown) wins over
    /// frames still buffered in the stream.
    pub async fn next(&mut self) -> Inbound {
        loop {
            let frame = tokio::select! {
                biased;
                () = self.connection.closed() => None,
                frame = self.stream.next() => Some(frame),
            };
            let Some(frame) = frame else {
                return Inbound::Closed(self.latched(CloseReason::LocalRequested));
            };
            match frame {
                Some(Ok(Frame::Text(text))) => {
                    self.connection.mark_alive();
                    return Inbound::Payload(text.into_bytes());
                }
                Some(Ok(Frame::Binary(bytes))) => {
                    self.connection.mark_alive();
                    return Inbound::Payload(bytes);
                }
                Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => self.connection.mark_alive(),
                Some(Ok(Frame::Close(close))) => {
                    debug!(
                        conn_id = %self.connection.id(),
                        code = close.as_ref().map(|c| c.code),
                        "client sent close"
                    );
                    return Inbound::Closed(self.close_with(CloseReason::Remote));
                }
                Some(Err(e)) => {
                    debug!(conn_id = %self.connection.id(), error = %e, "transport error");
                    return Inbound::Closed(self.close_with(CloseReason::ProtocolError));
                }
                None => return Inbound::Closed(self.close_with(CloseReason::Remote)),
            }
        }
    }

    fn close_with(&self, reason: CloseReason) -> CloseReason {
        let _ = self.connection.close(reason);
        self.latched(reason)
    }

    fn latched(&self, fallback: CloseReason) -> CloseReason {
        self.connection.close_reason().unwrap_or(fallback)
    }
}

/// Drain the outbound queue into `sink` until the connection closes.
///
/// With `ping_interval` set, a ping is written every interval. On close the
/// messages queued before the close are flushed (unless the peer is already
/// gone), then the close frame for the latched reason is sent.
pub async fn run_writer<Si>(
    mut sink: Si,
    mut outbound: mpsc::Receiver<Arc<str>>,
    connection: Arc<ClientConnection>,
    ping_interval: Option<Duration>,
) where
    Si: Sink<Frame> + Unpin,
    Si::Error: fmt::Display,
{
    let mut ping = ping_interval.map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            biased;
            () = connection.closed() => break,
            message = outbound.recv() => {
                let Some(text) = message else { break };
                if let Err(e) = sink.send(Frame::Text(text.as_ref().to_owned())).await {
                    debug!(conn_id = %connection.id(), error = %e, "write failed");
                    let _ = connection.close(CloseReason::ProtocolError);
                }
            }
            () = next_tick(ping.as_mut()) => {
                if let Err(e) = sink.send(Frame::Ping(Vec::new())).await {
                    debug!(conn_id = %connection.id(), error = %e, "ping failed");
                    let _ = connection.close(CloseReason::ProtocolError);
                }
            }
        }
    }

    let reason = connection
        .close_reason()
        .unwrap_or(CloseReason::LocalRequested);
    if !matches!(reason, CloseReason::Remote | CloseReason::ProtocolError) {
        outbound.close();
        while let Ok(text) = outbound.try_recv() {
            if sink.send(Frame::Text(text.as_ref().to_owned())).await.is_err() {
                break;
            }
        }
    }
    if let Some(frame) = close_frame_for(reason) {
        let _ = sink.send(Frame::Close(Some(frame))).await;
    }
    let _ = sink.close().await;
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
