//! Firestore request metrics.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Total Firestore requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "leafscan_firestore_requests_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "leafscan_firestore_latency_seconds";

    /// Precondition conflicts observed on guarded writes.
    pub const PRECONDITION_CONFLICTS_TOTAL: &str = "leafscan_firestore_precondition_conflicts_total";
}

/// Record a completed Firestore request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a lost optimistic-concurrency race on a guarded write.
pub fn record_precondition_conflict(operation: &str) {
    counter!(
        names::PRECONDITION_CONFLICTS_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}
