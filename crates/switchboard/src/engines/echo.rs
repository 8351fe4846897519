use async_trait::async_trait;
use switchboard_core::{Engine, EngineCommand, EngineEvent, EnginePorts};
use tracing::debug;

/// Sends every payload back to the connection it came from.
pub struct EchoEngine;

#[async_trait]
impl Engine for EchoEngine {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn run(self: Box<Self>, mut ports: EnginePorts) {
        while let Some(event) = ports.events.recv().await {
            match event {
                EngineEvent::Message { id, payload, .. } => {
                    if ports.commands.send(EngineCommand::Send { id, payload }).await.is_err() {
                        break;
                    }
                }
                EngineEvent::Connection { id, .. } => debug!(conn_id = %id, "echo: joined"),
                EngineEvent::Disconnection { id, reason, .. } => {
                    debug!(conn_id = %id, %reason, "echo: left");
                }
            }
        }
    }
}
