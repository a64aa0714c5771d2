//! Prometheus metrics

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Setup Prometheus metrics exporter
/// Returns a handle that can be used to retrieve metrics
pub fn setup_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter installed");

    Ok(handle)
}

/// Record a routed request
pub fn record_request(route: &str, method: &str, status: u16) {
    metrics::counter!("chat_router_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a path that matched no route
pub fn record_unresolved() {
    metrics::counter!("chat_router_unresolved_total").increment(1);
}

/// Record a failed authentication attempt
pub fn record_auth_failure(scheme: &str) {
    metrics::counter!("chat_router_auth_failures_total",
        "scheme" => scheme.to_string()
    )
    .increment(1);
}
