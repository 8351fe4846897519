//! `RelayServer`: the HTTP and WebSocket gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::{self, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::HOST;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt, future};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use switchboard_core::{EngineCommand, EngineHandle, Origin};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::errors::{ServerError, TransportError};
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::relay::Relay;
use crate::relay::transport::{CloseFrame, Frame};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay core.
    pub relay: Arc<Relay>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Tracks connection tasks so shutdown can wait for them.
    pub tracker: TaskTracker,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    relay: Arc<Relay>,
    commands: Mutex<Option<mpsc::Receiver<EngineCommand>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    dispatcher_stop: CancellationToken,
    shutdown: Arc<ShutdownCoordinator>,
    tracker: TaskTracker,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a server relaying between clients and the engine behind `engine`.
    pub fn new(config: ServerConfig, engine: EngineHandle) -> Self {
        let relay = Arc::new(Relay::new(config.relay_config(), engine.events));
        Self {
            config: Arc::new(config),
            relay,
            commands: Mutex::new(Some(engine.commands)),
            dispatcher: Mutex::new(None),
            dispatcher_stop: CancellationToken::new(),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            tracker: TaskTracker::new(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            shutdown: self.shutdown.clone(),
            tracker: self.tracker.clone(),
            start_time: self.start_time,
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and start serving.
    ///
    /// Spawns the engine command dispatcher and the accept loop. The accept
    /// loop stops when shutdown begins; the dispatcher keeps running until
    /// every connection task has finished. Returns the bound address and the
    /// accept loop's handle.
    pub async fn listen(
        &self,
    ) -> Result<(SocketAddr, JoinHandle<Result<(), ServerError>>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        let commands = self
            .commands
            .lock()
            .take()
            .ok_or(ServerError::AlreadyListening)?;

        let dispatcher = tokio::spawn(
            self.relay
                .clone()
                .run_dispatcher(commands, self.dispatcher_stop.clone()),
        );
        *self.dispatcher.lock() = Some(dispatcher);

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
                .map_err(ServerError::Serve)
        });

        info!(addr = %local_addr, "relay server listening");
        Ok((local_addr, handle))
    }

    /// Stop accepting, close every connection as shutdown, and wait up to
    /// `shutdown_timeout_secs` for connection tasks to finish. Returns `false`
    /// if the wait timed out.
    ///
    /// Once the connections are done the engine's event stream is ended. The
    /// dispatcher keeps applying engine commands until the engine drops its
    /// command sender (or the timeout passes again), so an engine that
    /// replies to each event still sees every `Disconnection`.
    pub async fn shutdown_gracefully(&self) -> bool {
        self.shutdown.shutdown();
        let closed = self.relay.shut_down();
        info!(closed, "closing open connections");
        let drained = self
            .shutdown
            .graceful_shutdown(&self.tracker, Some(self.config.shutdown_timeout()))
            .await;

        self.relay.end_events();
        let dispatcher = self.dispatcher.lock().take();
        if let Some(mut dispatcher) = dispatcher {
            if tokio::time::timeout(self.config.shutdown_timeout(), &mut dispatcher)
                .await
                .is_err()
            {
                warn!("engine did not finish its commands in time, stopping dispatcher");
                self.dispatcher_stop.cancel();
                let _ = dispatcher.await;
            }
        }
        drained
    }

    /// Get the relay core.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// `GET /` upgrades to a WebSocket.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if state.shutdown.is_shutting_down() {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL, "cause" => "shutdown").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let active = state.relay.registry().len();
    if active >= state.config.max_connections {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL, "cause" => "limit").increment(1);
        warn!(active, max = state.config.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    let origin = origin_from_request(&uri, &headers);
    let relay = state.relay.clone();
    let tracker = state.tracker.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| tracker.track_future(serve_socket(socket, relay, origin)))
}

async fn serve_socket(socket: WebSocket, relay: Arc<Relay>, origin: Origin) {
    let (sink, stream) = socket.split();
    let stream = stream.map(|message| message.map(Frame::from).map_err(TransportError::new));
    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));
    relay.serve_connection(stream, sink, origin).await;
}

/// Origin metadata from the handshake: `wss` behind a TLS-terminating proxy
/// that sets `X-Forwarded-Proto: https`, host from the `Host` header.
fn origin_from_request(uri: &Uri, headers: &HeaderMap) -> Origin {
    let scheme = match headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
    {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "wss",
        _ => "ws",
    };
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    Origin::parse(scheme, host, target)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.relay.registry().len(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(bytes) => Self::Binary(bytes.to_vec()),
            Message::Ping(bytes) => Self::Ping(bytes.to_vec()),
            Message::Pong(bytes) => Self::Pong(bytes.to_vec()),
            Message::Close(close) => Self::Close(close.map(|c| CloseFrame {
                code: c.code,
                reason: c.reason.as_str().to_owned(),
            })),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::Text(text.into()),
            Frame::Binary(bytes) => Self::Binary(bytes.into()),
            Frame::Ping(bytes) => Self::Ping(bytes.into()),
            Frame::Pong(bytes) => Self::Pong(bytes.into()),
            Frame::Close(close) => Self::Close(close.map(|c| ws::CloseFrame {
                code: c.code,
                reason: c.reason.into(),
            })),
        }
    }
}
