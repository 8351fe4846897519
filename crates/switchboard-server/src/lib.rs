//! # switchboard-server
//!
//! Axum HTTP + `WebSocket` relay between many clients and one engine.
//!
//! - `WebSocket` gateway on `/`: one task per connection, identity allocation,
//!   origin metadata, heartbeat
//! - [`relay::Relay`]: connection state machine and engine command dispatch
//! - [`relay::registry::ConnectionRegistry`]: identity → connection directory
//! - HTTP endpoints: `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use relay::{Relay, RelayConfig};
pub use server::RelayServer;
