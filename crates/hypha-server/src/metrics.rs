//! Prometheus metrics recorder, metric names, and the HTTP request
//! metrics middleware.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Call once at
/// startup, before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// HTTP requests served (counter, labels: method, endpoint, status).
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
/// HTTP request latency (histogram, labels: method, endpoint).
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
/// WebSocket sessions opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Broadcast deliveries that failed (counter).
pub const WS_BROADCAST_FAILURES_TOTAL: &str = "ws_broadcast_failures_total";
/// Heartbeat sends that failed (counter).
pub const WS_HEARTBEAT_FAILURES_TOTAL: &str = "ws_heartbeat_failures_total";
/// Chain runs (counter, labels: kind).
pub const CHAIN_RUNS_TOTAL: &str = "chain_runs_total";
/// Chain run duration seconds (histogram, labels: kind).
pub const CHAIN_RUN_DURATION_SECONDS: &str = "chain_run_duration_seconds";

/// Record count and latency of every routed request.
///
/// `endpoint` is the route template (`/api/agent/{name}/ask`), never the
/// raw path, so label cardinality is bounded by the route table.
pub async fn track_http(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_owned(), |path| path.as_str().to_owned());
    let method = request.method().as_str().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "endpoint" => endpoint.clone(),
        "status" => status
    )
    .increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64());
    response
}
