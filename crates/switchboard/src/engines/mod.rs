//! Built-in engines selectable from configuration.

mod broadcast;
mod echo;
mod stdio;

pub use broadcast::BroadcastEngine;
pub use echo::EchoEngine;
pub use stdio::StdioEngine;

use serde::{Deserialize, Serialize};
use switchboard_core::Engine;

/// Which engine the binary runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Reply to each message on the connection that sent it.
    #[default]
    Echo,
    /// Fan every message out to all connections.
    Broadcast,
    /// Bridge envelopes to an external process over stdin/stdout as JSON lines.
    Stdio,
}

/// Instantiate the configured engine.
pub fn build(kind: EngineKind) -> Box<dyn Engine> {
    match kind {
        EngineKind::Echo => Box::new(EchoEngine),
        EngineKind::Broadcast => Box::new(BroadcastEngine),
        EngineKind::Stdio => Box::new(StdioEngine::stdio()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_names_match_kind() {
        assert_eq!(build(EngineKind::Echo).name(), "echo");
        assert_eq!(build(EngineKind::Broadcast).name(), "broadcast");
        assert_eq!(build(EngineKind::Stdio).name(), "stdio");
    }

    #[test]
    fn kind_deserializes_lowercase() {
        let kind: EngineKind = serde_json::from_str(r#""broadcast""#).unwrap();
        assert_eq!(kind, EngineKind::Broadcast);
        assert_eq!(EngineKind::default(), EngineKind::Echo);
    }
}
