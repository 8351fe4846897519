//! # switchboard-core
//!
//! Foundation types shared by the relay and its engines:
//!
//! - [`ConnectionId`]: random per-connection identity
//! - [`Origin`]: handshake URL metadata attached to every envelope
//! - [`EngineEvent`] / [`EngineCommand`]: the tagged envelopes exchanged with the engine
//! - [`codec`]: JSON encode/decode at the transport and engine boundaries
//! - [`engine`]: channel pair and [`Engine`] trait for plugging in an engine
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod codec;
pub mod engine;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod origin;

pub use engine::{Engine, EngineHandle, EnginePorts, engine_channel};
pub use envelope::{CloseReason, EngineCommand, EngineEvent};
pub use errors::DecodeError;
pub use ids::ConnectionId;
pub use origin::Origin;
