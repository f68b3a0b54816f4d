//! Prometheus Metrics Definitions
//!
//! Defines all TAGFORGE metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Upstream call latency buckets (seconds), up to the request timeout
const UPSTREAM_LATENCY_BUCKETS: &[f64] = &[0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<TagforgeMetrics>> = Lazy::new(TagforgeMetrics::new);

/// Run `f` against the global metrics if they registered successfully.
pub fn with_metrics<F: FnOnce(&TagforgeMetrics)>(f: F) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Container for all TAGFORGE metrics.
#[derive(Clone)]
pub struct TagforgeMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Upstream call counter - labels: operation, outcome (success/error)
    pub upstream_calls_total: CounterVec,

    /// Upstream call duration histogram - labels: operation
    pub upstream_call_duration_seconds: HistogramVec,

    /// Cache read counter - labels: cache (tags/artifact), outcome (hit/refreshed/stale/error)
    pub cache_reads_total: CounterVec,

    /// Build dispatch counter - labels: outcome
    pub dispatches_total: CounterVec,

    /// Clients currently tracked by the dispatch quota
    pub dispatch_quota_clients: Gauge,

    /// Client IPs currently holding a flood limiter
    pub rate_limit_clients: Gauge,
}

impl TagforgeMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "tagforge_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "tagforge_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            upstream_calls_total: register_counter_vec!(
                "tagforge_upstream_calls_total",
                "Total number of source-control API calls",
                &["operation", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register upstream_calls_total: {}", e)))?,

            upstream_call_duration_seconds: register_histogram_vec!(
                "tagforge_upstream_call_duration_seconds",
                "Source-control API call duration in seconds",
                &["operation"],
                UPSTREAM_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register upstream_call_duration_seconds: {}", e)))?,

            cache_reads_total: register_counter_vec!(
                "tagforge_cache_reads_total",
                "Cache reads by outcome",
                &["cache", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_reads_total: {}", e)))?,

            dispatches_total: register_counter_vec!(
                "tagforge_dispatches_total",
                "Build dispatch requests by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register dispatches_total: {}", e)))?,

            dispatch_quota_clients: register_gauge!(
                "tagforge_dispatch_quota_clients",
                "Clients tracked by the dispatch quota"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register dispatch_quota_clients: {}", e)))?,

            rate_limit_clients: register_gauge!(
                "tagforge_rate_limit_clients",
                "Client IPs tracked by the flood limiter"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register rate_limit_clients: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record an upstream call.
    pub fn record_upstream_call(&self, operation: &str, success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "error" };
        self.upstream_calls_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.upstream_call_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Record a cache read.
    pub fn record_cache_read(&self, cache: &str, outcome: &str) {
        self.cache_reads_total
            .with_label_values(&[cache, outcome])
            .inc();
    }

    /// Record a dispatch outcome.
    pub fn record_dispatch(&self, outcome: &str) {
        self.dispatches_total.with_label_values(&[outcome]).inc();
    }

    /// Set the number of clients tracked by the dispatch quota.
    pub fn set_dispatch_quota_clients(&self, count: usize) {
        self.dispatch_quota_clients.set(count as f64);
    }

    /// Set the number of client IPs tracked by the flood limiter.
    pub fn set_rate_limit_clients(&self, count: usize) {
        self.rate_limit_clients.set(count as f64);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    // Force registration so a fresh process still exposes the families.
    Lazy::force(&METRICS);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
