//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the process-wide Prometheus recorder.
///
/// Only the first call in a process succeeds. Hand the returned handle to
/// [`Gateway::with_metrics`](crate::Gateway::with_metrics).
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("metrics recorder installed");
    Ok(handle)
}

/// Prometheus text exposition of everything recorded so far.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric names shared across the gateway. The dispatcher in gate-core records
// the `action_*` series under the same names.

/// Action dispatches total (counter, labels: action).
pub const ACTION_REQUESTS_TOTAL: &str = "action_requests_total";
/// Failed action dispatches total (counter, labels: action, code).
pub const ACTION_ERRORS_TOTAL: &str = "action_errors_total";
/// Action duration seconds (histogram, labels: action).
pub const ACTION_DURATION_SECONDS: &str = "action_duration_seconds";
/// HTTP requests that matched no route (counter).
pub const HTTP_ROUTE_MISSES_TOTAL: &str = "http_route_misses_total";
/// Sessions opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Sessions removed from the table (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Sessions currently in the table (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Broadcast messages dropped for a full subscriber queue (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Broadcasts accepted onto the shared queue (counter).
pub const BROADCASTS_PUBLISHED_TOTAL: &str = "broadcasts_published_total";
