//! Relay and server error types.
//!
//! Everything except [`ServerError`] is contained within a single connection:
//! it is logged and turned into a dropped frame or a close, never propagated.

use std::fmt;

use switchboard_core::ConnectionId;
use thiserror::Error;

/// Registry invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A handle with this identity is already registered.
    #[error("duplicate connection identity: {0}")]
    DuplicateIdentity(ConnectionId),
}

/// Outbound delivery failures. Both are best-effort no-ops for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection is closing or its writer is gone.
    #[error("connection {0} is closing")]
    SendAfterClose(ConnectionId),
    /// The per-connection outbound queue is full.
    #[error("outbound queue full for {0}")]
    QueueFull(ConnectionId),
}

/// The underlying transport reported a failure (reset, protocol violation).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    /// Wrap any displayable transport error.
    pub fn new(err: impl fmt::Display) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// Process-level failures starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listen address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The accept loop failed.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
    /// `listen` was called more than once.
    #[error("server is already listening")]
    AlreadyListening,
}
