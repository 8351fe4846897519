//! Envelopes exchanged between the relay and the engine.
//!
//! Both directions are internally tagged on `"type"`, so on the wire an event
//! looks like `{"type":"Message","id":"conn_…","origin":{…},"payload":{…}}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ConnectionId;
use crate::origin::Origin;

/// Why a connection left the `Open` state.
///
/// The first trigger to fire wins; later triggers for the same connection are
/// ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The client closed the socket or the stream ended.
    Remote,
    /// The transport failed (reset, invalid frame, write error).
    ProtocolError,
    /// The engine asked for the connection to be closed.
    LocalRequested,
    /// The client stopped answering heartbeat pings.
    TimedOut,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Stable lowercase label, used for logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::ProtocolError => "protocol_error",
            Self::LocalRequested => "local_requested",
            Self::TimedOut => "timed_out",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relay → engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// A connection opened and was registered.
    Connection {
        /// Identity of the new connection.
        id: ConnectionId,
        /// Handshake URL metadata.
        origin: Arc<Origin>,
    },
    /// A connection closed. Emitted exactly once per identity and always last.
    Disconnection {
        /// Identity of the closed connection.
        id: ConnectionId,
        /// Handshake URL metadata.
        origin: Arc<Origin>,
        /// Trigger that started the close.
        reason: CloseReason,
    },
    /// One decoded inbound frame.
    Message {
        /// Identity of the sending connection.
        id: ConnectionId,
        /// Handshake URL metadata.
        origin: Arc<Origin>,
        /// Decoded frame payload.
        payload: Value,
    },
}

impl EngineEvent {
    /// Identity this event is about.
    pub fn id(&self) -> &ConnectionId {
        match self {
            Self::Connection { id, .. }
            | Self::Disconnection { id, .. }
            | Self::Message { id, .. } => id,
        }
    }

    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "Connection",
            Self::Disconnection { .. } => "Disconnection",
            Self::Message { .. } => "Message",
        }
    }
}

/// Engine → relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineCommand {
    /// Deliver `payload` to the connection with identity `id`.
    Send {
        /// Target connection.
        id: ConnectionId,
        /// Payload to encode and send as a text frame.
        payload: Value,
    },
    /// Close the connection with identity `id`.
    Close {
        /// Target connection.
        id: ConnectionId,
    },
    /// Deliver `payload` to every open connection.
    Broadcast {
        /// Payload to encode once and fan out.
        payload: Value,
    },
}

impl EngineCommand {
    /// Short name of the variant, for logging and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "Send",
            Self::Close { .. } => "Close",
            Self::Broadcast { .. } => "Broadcast",
        }
    }
}
