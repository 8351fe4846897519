//! JSON codec for client frames and engine envelopes.
//!
//! Client frames carry an arbitrary JSON payload. Engine envelopes use the
//! tagged representation defined in [`crate::envelope`]; the helpers here are
//! for engines living outside the process.

use serde_json::Value;

use crate::envelope::{EngineCommand, EngineEvent};
use crate::errors::Result;

/// Decode one inbound frame (text or binary) into a payload value.
pub fn decode(raw: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(raw)?)
}

/// Encode an outbound payload as frame text.
pub fn encode(payload: &Value) -> String {
    payload.to_string()
}

/// Encode an event for an out-of-process engine.
pub fn encode_event(event: &EngineEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

/// Decode a command produced by an out-of-process engine.
pub fn decode_command(raw: &[u8]) -> Result<EngineCommand> {
    Ok(serde_json::from_slice(raw)?)
}
