//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::relay::RelayConfig;

/// Configuration for the relay server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of the event channel into the engine.
    pub inbound_buffer: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_queue: usize,
    /// Heartbeat ping interval in seconds, `0` disables heartbeats.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// How long shutdown waits for connections to drain.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            inbound_buffer: 1024,
            outbound_queue: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Per-connection settings handed to the relay core.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            outbound_queue: self.outbound_queue,
            heartbeat_interval: (self.heartbeat_interval_secs > 0)
                .then(|| Duration::from_secs(self.heartbeat_interval_secs)),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
            ..RelayConfig::default()
        }
    }

    /// Shutdown drain timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
