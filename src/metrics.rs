//! Prometheus metrics for the error pipeline.
//!
//! This module provides:
//! - Request latency, measured around the whole pipeline
//! - Error responses by status code
//! - Masked faults, not-found hits and caught panics

use std::time::Instant;

use axum::http::StatusCode;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Error responses counter metric name.
pub const METRIC_ERROR_RESPONSES: &str = "error_responses_total";
/// Masked faults counter metric name.
pub const METRIC_MASKED_FAULTS: &str = "masked_faults_total";
/// Not-found counter metric name.
pub const METRIC_NOT_FOUND: &str = "not_found_total";
/// Caught panics counter metric name.
pub const METRIC_HANDLER_PANICS: &str = "handler_panics_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );

    describe_counter!(
        METRIC_ERROR_RESPONSES,
        "Total number of error responses sent, by status code"
    );
    describe_counter!(
        METRIC_MASKED_FAULTS,
        "Total number of unexpected faults masked as a generic 500"
    );
    describe_counter!(
        METRIC_NOT_FOUND,
        "Total number of requests that matched no route"
    );
    describe_counter!(
        METRIC_HANDLER_PANICS,
        "Total number of handler panics caught"
    );

    debug!("Metrics initialized");
}

/// Increment error responses counter.
pub fn inc_error_responses(status: StatusCode) {
    counter!(METRIC_ERROR_RESPONSES, "code" => status.as_u16().to_string()).increment(1);
}

/// Increment masked faults counter.
pub fn inc_masked_faults() {
    counter!(METRIC_MASKED_FAULTS).increment(1);
}

/// Increment not-found counter.
pub fn inc_not_found() {
    counter!(METRIC_NOT_FOUND).increment(1);
}

/// Increment caught panics counter.
pub fn inc_handler_panics() {
    counter!(METRIC_HANDLER_PANICS).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for a whole HTTP request.
pub fn timer_http_request() -> LatencyTimer {
    LatencyTimer::new(METRIC_HTTP_REQUEST_LATENCY)
}
