//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a global recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connections refused at upgrade (counter, labels: cause).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Inbound frames dropped as malformed (counter).
pub const RELAY_DECODE_ERRORS_TOTAL: &str = "relay_decode_errors_total";
/// Outbound messages dropped on a full queue (counter).
pub const RELAY_OUTBOUND_DROPS_TOTAL: &str = "relay_outbound_drops_total";
/// Engine commands dispatched (counter, labels: kind).
pub const RELAY_COMMANDS_TOTAL: &str = "relay_commands_total";
/// Engine commands addressed to an identity that is not live (counter, labels: kind).
pub const RELAY_COMMANDS_UNMATCHED_TOTAL: &str = "relay_commands_unmatched_total";
