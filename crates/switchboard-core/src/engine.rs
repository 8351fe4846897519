//! The engine seam: two bounded channels and a trait to drive them.
//!
//! The relay owns an [`EngineHandle`] (it sends events, receives commands);
//! the engine owns the matching [`EnginePorts`]. Inbound events are bounded so
//! a slow engine applies backpressure to the relay instead of growing memory.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::envelope::{EngineCommand, EngineEvent};

/// Relay side of the engine channels.
pub struct EngineHandle {
    /// Events flowing into the engine.
    pub events: mpsc::Sender<EngineEvent>,
    /// Commands produced by the engine.
    pub commands: mpsc::Receiver<EngineCommand>,
}

/// Engine side of the engine channels.
pub struct EnginePorts {
    /// Events produced by the relay.
    pub events: mpsc::Receiver<EngineEvent>,
    /// Commands for the relay.
    pub commands: mpsc::Sender<EngineCommand>,
}

/// Create a connected handle/ports pair. Both directions use `capacity`
/// (clamped to at least 1).
pub fn engine_channel(capacity: usize) -> (EngineHandle, EnginePorts) {
    let capacity = capacity.max(1);
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let (command_tx, command_rx) = mpsc::channel(capacity);
    (
        EngineHandle {
            events: event_tx,
            commands: command_rx,
        },
        EnginePorts {
            events: event_rx,
            commands: command_tx,
        },
    )
}

/// An event-processing engine.
///
/// `run` consumes events until the relay drops its sender, issuing commands
/// as it goes. Returning drops the command sender, which stops the relay's
/// dispatcher.
#[async_trait]
pub trait Engine: Send {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Drive the engine to completion.
    async fn run(self: Box<Self>, ports: EnginePorts);
}
