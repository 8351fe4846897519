//! Relay core: per-connection lifecycle and engine command dispatch.
//!
//! Each connection moves `Open → Closing → Closed`. Any trigger may start
//! closing (client close, transport error, heartbeat timeout, engine `Close`,
//! shutdown); the first one latches the reason. Teardown runs once behind the
//! finalize latch and ends with exactly one `Disconnection` for the engine.

pub mod connection;
pub mod heartbeat;
pub mod registry;
pub mod transport;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use switchboard_core::{CloseReason, ConnectionId, EngineCommand, EngineEvent, Origin, codec};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use self::connection::ClientConnection;
use self::heartbeat::HeartbeatResult;
use self::registry::ConnectionRegistry;
use self::transport::{CLOSE_INTERNAL, CloseFrame, Frame, Inbound, InboundPump};
use crate::errors::{SendError, TransportError};
use crate::metrics::{
    RELAY_COMMANDS_TOTAL, RELAY_COMMANDS_UNMATCHED_TOTAL, RELAY_DECODE_ERRORS_TOTAL,
    RELAY_OUTBOUND_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Per-connection settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Outbound queue capacity per connection.
    pub outbound_queue: usize,
    /// Ping interval; `None` disables heartbeats.
    pub heartbeat_interval: Option<Duration>,
    /// Silence tolerated before a connection is closed as timed out.
    pub heartbeat_timeout: Duration,
    /// How long teardown waits for the writer to flush.
    pub writer_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            heartbeat_interval: Some(Duration::from_secs(30)),
            heartbeat_timeout: Duration::from_secs(90),
            writer_grace: Duration::from_secs(5),
        }
    }
}

/// Connection lifecycle and routing between clients and the engine.
pub struct Relay {
    config: RelayConfig,
    registry: ConnectionRegistry,
    events: Mutex<Option<mpsc::Sender<EngineEvent>>>,
    closing: CancellationToken,
}

impl Relay {
    /// Create a relay emitting engine events on `events`.
    pub fn new(config: RelayConfig, events: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
            events: Mutex::new(Some(events)),
            closing: CancellationToken::new(),
        }
    }

    /// Live connection directory.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Serve one accepted transport until it closes.
    ///
    /// Allocates an identity, registers the connection, and emits
    /// `Connection`, one `Message` per decoded frame, and finally one
    /// `Disconnection`. Returns after teardown.
    pub async fn serve_connection<St, Si>(&self, stream: St, sink: Si, origin: Origin)
    where
        St: Stream<Item = Result<Frame, TransportError>> + Unpin + Send + 'static,
        Si: Sink<Frame> + Unpin + Send + 'static,
        Si::Error: fmt::Display,
    {
        self.serve_as(ConnectionId::new(), stream, sink, origin).await;
    }

    async fn serve_as<St, Si>(&self, id: ConnectionId, stream: St, mut sink: Si, origin: Origin)
    where
        St: Stream<Item = Result<Frame, TransportError>> + Unpin + Send + 'static,
        Si: Sink<Frame> + Unpin + Send + 'static,
        Si::Error: fmt::Display,
    {
        let (tx, rx) = mpsc::channel(self.config.outbound_queue.max(1));
        let connection = Arc::new(ClientConnection::new(id, Arc::new(origin), tx));

        if let Err(e) = self.registry.insert(connection.clone()) {
            error!(error = %e, "rejecting connection");
            let frame = CloseFrame::new(CLOSE_INTERNAL, "identity collision");
            let _ = sink.send(Frame::Close(Some(frame))).await;
            let _ = sink.close().await;
            return;
        }
        // Checked after insert so a concurrent shut_down either sees this
        // connection in its snapshot or is seen here.
        if self.closing.is_cancelled() {
            let _ = connection.close(CloseReason::Shutdown);
        }

        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        self.record_active();
        info!(
            conn_id = %connection.id(),
            origin = %connection.origin().href,
            "connection opened"
        );

        self.emit(
            &connection,
            EngineEvent::Connection {
                id: connection.id().clone(),
                origin: connection.origin().clone(),
            },
        )
        .await;

        let writer = tokio::spawn(transport::run_writer(
            sink,
            rx,
            connection.clone(),
            self.config.heartbeat_interval,
        ));
        let heartbeat = self.config.heartbeat_interval.map(|interval| {
            tokio::spawn(heartbeat::run_heartbeat(
                connection.clone(),
                interval,
                self.config.heartbeat_timeout,
            ))
        });

        let mut pump = InboundPump::new(stream, connection.clone());
        let reason = loop {
            match pump.next().await {
                Inbound::Payload(bytes) => match codec::decode(&bytes) {
                    Ok(payload) => {
                        self.emit(
                            &connection,
                            EngineEvent::Message {
                                id: connection.id().clone(),
                                origin: connection.origin().clone(),
                                payload,
                            },
                        )
                        .await;
                    }
                    Err(e) => {
                        counter!(RELAY_DECODE_ERRORS_TOTAL).increment(1);
                        warn!(
                            conn_id = %connection.id(),
                            len = bytes.len(),
                            error = %e,
                            "dropping malformed frame"
                        );
                    }
                },
                Inbound::Closed(reason) => break reason,
            }
        };

        self.finalize(&connection, reason, writer, heartbeat).await;
    }

    /// Drop the relay's event sender. The engine drains what is buffered,
    /// then sees the end of its event stream; later events are discarded.
    pub fn end_events(&self) {
        drop(self.events.lock().take());
    }

    /// Send `event` to the engine, waiting for capacity. Returns `false` if
    /// the engine is gone or events have ended.
    async fn send_event(&self, event: EngineEvent) -> bool {
        let sender = self.events.lock().clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Forward an event to the engine, waiting for capacity. If the engine is
    /// gone the connection is closed as shutdown.
    async fn emit(&self, connection: &ClientConnection, event: EngineEvent) {
        let kind = event.kind();
        if !self.send_event(event).await {
            debug!(conn_id = %connection.id(), kind, "engine gone, event dropped");
            let _ = connection.close(CloseReason::Shutdown);
        }
    }

    async fn finalize(
        &self,
        connection: &Arc<ClientConnection>,
        reason: CloseReason,
        mut writer: JoinHandle<()>,
        heartbeat: Option<JoinHandle<HeartbeatResult>>,
    ) {
        if !connection.mark_finalized() {
            return;
        }
        let _ = connection.close(reason);
        let reason = connection.close_reason().unwrap_or(reason);
        let _ = self.registry.remove(connection.id());
        self.record_active();

        if let Some(heartbeat) = heartbeat {
            heartbeat.abort();
        }
        if tokio::time::timeout(self.config.writer_grace, &mut writer)
            .await
            .is_err()
        {
            warn!(conn_id = %connection.id(), "writer did not finish in time, aborting");
            writer.abort();
        }

        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        info!(
            conn_id = %connection.id(),
            %reason,
            dropped = connection.drop_count(),
            age_secs = connection.age().as_secs(),
            "connection closed"
        );

        let event = EngineEvent::Disconnection {
            id: connection.id().clone(),
            origin: connection.origin().clone(),
            reason,
        };
        if !self.send_event(event).await {
            debug!(conn_id = %connection.id(), "engine gone, disconnection dropped");
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_active(&self) {
        gauge!(WS_CONNECTIONS_ACTIVE).set(self.registry.len() as f64);
    }

    /// Apply one engine command. Returns how many connections it reached;
    /// commands for identities that are not live reach none and do nothing.
    pub fn dispatch(&self, command: EngineCommand) -> usize {
        let kind = command.kind();
        counter!(RELAY_COMMANDS_TOTAL, "kind" => kind).increment(1);
        match command {
            EngineCommand::Send { id, payload } => {
                let Some(connection) = self.registry.lookup(&id) else {
                    counter!(RELAY_COMMANDS_UNMATCHED_TOTAL, "kind" => kind).increment(1);
                    debug!(conn_id = %id, "send to unknown connection, dropping");
                    return 0;
                };
                usize::from(deliver(&connection, Arc::from(codec::encode(&payload))))
            }
            EngineCommand::Close { id } => {
                let Some(connection) = self.registry.lookup(&id) else {
                    counter!(RELAY_COMMANDS_UNMATCHED_TOTAL, "kind" => kind).increment(1);
                    debug!(conn_id = %id, "close for unknown connection, ignoring");
                    return 0;
                };
                if connection.close(CloseReason::LocalRequested) {
                    debug!(conn_id = %id, "engine requested close");
                }
                1
            }
            EngineCommand::Broadcast { payload } => {
                let text: Arc<str> = Arc::from(codec::encode(&payload));
                let targets = self.registry.snapshot();
                let reached = targets
                    .iter()
                    .filter(|connection| deliver(connection, text.clone()))
                    .count();
                debug!(recipients = targets.len(), reached, "broadcast");
                reached
            }
        }
    }

    /// Consume engine commands in order until the engine drops its sender or
    /// `cancel` fires.
    pub async fn run_dispatcher(
        self: Arc<Self>,
        mut commands: mpsc::Receiver<EngineCommand>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => {
                        let _ = self.dispatch(command);
                    }
                    None => {
                        info!("engine command stream ended");
                        break;
                    }
                },
            }
        }
    }

    /// Close every open connection with `reason`. Returns how many closes
    /// this call latched.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        self.registry
            .snapshot()
            .iter()
            .filter(|connection| connection.close(reason))
            .count()
    }

    /// Close every open connection as shutdown, including ones registering
    /// concurrently with this call.
    pub fn shut_down(&self) -> usize {
        self.closing.cancel();
        self.close_all(CloseReason::Shutdown)
    }
}

fn deliver(connection: &ClientConnection, text: Arc<str>) -> bool {
    match connection.send(text) {
        Ok(()) => true,
        Err(e @ SendError::SendAfterClose(_)) => {
            debug!(error = %e, "dropping message for closing connection");
            false
        }
        Err(e @ SendError::QueueFull(_)) => {
            counter!(RELAY_OUTBOUND_DROPS_TOTAL).increment(1);
            warn!(error = %e, dropped = connection.drop_count(), "dropping outbound message");
            false
        }
    }
}
