//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "leafscan_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "leafscan_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "leafscan_http_requests_in_flight";

    // Scan metrics
    pub const SCANS_TOTAL: &str = "leafscan_scans_total";
    pub const SCANS_DENIED_TOTAL: &str = "leafscan_scans_denied_total";
    pub const DETECTION_DURATION_SECONDS: &str = "leafscan_detection_duration_seconds";

    // Billing metrics
    pub const CHECKOUT_SESSIONS_TOTAL: &str = "leafscan_checkout_sessions_total";
    pub const SUBSCRIPTIONS_FULFILLED_TOTAL: &str = "leafscan_subscriptions_fulfilled_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "leafscan_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a completed scan, labeled by how it was funded.
pub fn record_scan(funding: &str) {
    let labels = [("funding", funding.to_string())];
    counter!(names::SCANS_TOTAL, &labels).increment(1);
}

/// Record a scan denied by the daily quota.
pub fn record_scan_denied() {
    counter!(names::SCANS_DENIED_TOTAL).increment(1);
}

/// Record detection latency.
pub fn record_detection_duration(duration_secs: f64) {
    histogram!(names::DETECTION_DURATION_SECONDS).record(duration_secs);
}

/// Record a checkout session created.
pub fn record_checkout_session(plan_id: &str) {
    let labels = [("plan", plan_id.to_string())];
    counter!(names::CHECKOUT_SESSIONS_TOTAL, &labels).increment(1);
}

/// Record a subscription fulfilled from a webhook.
pub fn record_subscription_fulfilled(plan_id: &str) {
    let labels = [("plan", plan_id.to_string())];
    counter!(names::SUBSCRIPTIONS_FULFILLED_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
