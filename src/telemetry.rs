//! Telemetry module for AuthRelay
//!
//! Prometheus counters for relay traffic and refresh outcomes.

use crate::{RelayError, Result};
use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, TextEncoder, register_counter_vec,
    register_histogram_vec,
};

/// HTTP requests total counter
static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "authrelay_http_requests_total",
        "Total number of HTTP requests received",
        &["handler", "method", "code"]
    )
    .unwrap()
});

/// HTTP request duration histogram
static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        HistogramOpts::new(
            "authrelay_http_request_duration_seconds",
            "Duration of HTTP requests in seconds"
        ),
        &["handler", "method"]
    )
    .unwrap()
});

/// Refresh attempts by outcome (success, rejected, timeout, joined)
static REFRESH_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "authrelay_refresh_attempts_total",
        "Total number of session refresh attempts",
        &["outcome"]
    )
    .unwrap()
});

/// Record HTTP request metric
pub fn record_http_request(handler: &str, method: &str, status_code: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[handler, method, &status_code.to_string()])
        .inc();
}

/// Record HTTP request duration
pub fn record_http_duration(handler: &str, method: &str, duration_secs: f64) {
    HTTP_REQUEST_DURATION
        .with_label_values(&[handler, method])
        .observe(duration_secs);
}

/// Record the outcome of a refresh attempt
pub fn record_refresh(outcome: &str) {
    REFRESH_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| RelayError::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| RelayError::config(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Per-route timer, finished once the response status is known
pub struct MetricsMiddleware {
    handler_name: String,
}

impl MetricsMiddleware {
    pub fn new(handler_name: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.into(),
        }
    }

    pub fn start(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    pub fn finish(&self, start: std::time::Instant, method: &str, status_code: u16) {
        record_http_request(&self.handler_name, method, status_code);
        record_http_duration(&self.handler_name, method, start.elapsed().as_secs_f64());
    }
}
