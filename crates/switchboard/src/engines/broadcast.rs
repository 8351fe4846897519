use async_trait::async_trait;
use serde_json::json;
use switchboard_core::{Engine, EngineCommand, EngineEvent, EnginePorts};

/// A single shared room: every message goes to every connection, tagged with
/// its sender, and joins and leaves are announced.
pub struct BroadcastEngine;

#[async_trait]
impl Engine for BroadcastEngine {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn run(self: Box<Self>, mut ports: EnginePorts) {
        while let Some(event) = ports.events.recv().await {
            let payload = match event {
                EngineEvent::Connection { id, .. } => json!({ "joined": id }),
                EngineEvent::Disconnection { id, reason, .. } => json!({ "left": id, "reason": reason }),
                EngineEvent::Message { id, payload, .. } => json!({ "from": id, "payload": payload }),
            };
            if ports.commands.send(EngineCommand::Broadcast { payload }).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchboard_core::{CloseReason, Origin, engine_channel};

    use super::*;

    #[tokio::test]
    async fn fans_out_tagged_messages_and_presence() {
        let (mut handle, ports) = engine_channel(8);
        let task = tokio::spawn(Box::new(BroadcastEngine).run(ports));
        let origin = Arc::new(Origin::parse("ws", "localhost", "/"));

        let events = [
            EngineEvent::Connection {
                id: "conn_a".into(),
                origin: origin.clone(),
            },
            EngineEvent::Message {
                id: "conn_a".into(),
                origin: origin.clone(),
                payload: json!("hello"),
            },
            EngineEvent::Disconnection {
                id: "conn_a".into(),
                origin,
                reason: CloseReason::TimedOut,
            },
        ];
        for event in events {
            handle.events.send(event).await.unwrap();
        }

        let expected = [
            json!({ "joined": "conn_a" }),
            json!({ "from": "conn_a", "payload": "hello" }),
            json!({ "left": "conn_a", "reason": "timed_out" }),
        ];
        for payload in expected {
            assert_eq!(
                handle.commands.recv().await.unwrap(),
                EngineCommand::Broadcast { payload }
            );
        }

        drop(handle.events);
        task.await.unwrap();
    }
}
