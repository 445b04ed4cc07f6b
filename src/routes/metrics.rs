use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

/// Install the global recorder and describe the application metrics.
pub fn install_recorder() -> Result<Arc<PrometheusHandle>, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("profile_requests_total", "Profile processing requests received");
    metrics::describe_counter!(
        "profile_requests_queued_total",
        "Profile requests that created a new queue row"
    );
    metrics::describe_counter!("random_pages_served_total", "Session-randomized pages served");
    metrics::describe_counter!("http_internal_errors_total", "Requests answered with a 500");
    metrics::describe_counter!(
        "viral_analyses_completed_total",
        "Viral analysis runs that stored a result"
    );
    metrics::describe_counter!("viral_analyses_failed_total", "Viral analysis runs that failed");
    metrics::describe_gauge!("queue_pending", "PENDING rows at the last stats request");

    Ok(Arc::new(handle))
}

/// Prometheus metrics scrape endpoint.
/// Returns metrics in Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
