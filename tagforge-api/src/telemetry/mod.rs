//! TAGFORGE Telemetry - Observability Infrastructure
//!
//! Structured logging via `tracing` and Prometheus metrics for the API
//! layer. Everything works standalone without external collectors.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, TagforgeMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracing, TelemetryConfig};
