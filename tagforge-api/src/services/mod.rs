//! Service Layer
//!
//! Business logic sitting between the route handlers and the upstream
//! source-control API:
//! - `tag_cache`: cached, semver-sorted tag list
//! - `build_status`: per-version latest build status
//! - `dispatch_quota`: fixed-window per-client dispatch quota
//! - `dispatcher`: validated build dispatch
//! - `artifact_proxy`: cached latest build artifact

mod artifact_proxy;
mod build_status;
mod dispatch_quota;
mod dispatcher;
mod tag_cache;

pub use artifact_proxy::ArtifactProxy;
pub use build_status::{BuildStatusAggregator, BuildsByTag};
pub use dispatch_quota::{spawn_quota_pruner, DispatchQuota, QuotaExceeded};
pub use dispatcher::{BuildDispatcher, DispatchOutcome};
pub use tag_cache::TagCache;

use std::future::Future;
use std::time::Instant;

use tagforge_core::UpstreamResult;

use crate::telemetry::metrics::with_metrics;

/// Await an upstream call, recording its latency and outcome.
pub(crate) async fn observe_upstream<T, F>(operation: &'static str, call: F) -> UpstreamResult<T>
where
    F: Future<Output = UpstreamResult<T>>,
{
    let start = Instant::now();
    let result = call.await;
    let elapsed = start.elapsed();

    with_metrics(|metrics| {
        metrics.record_upstream_call(operation, result.is_ok(), elapsed.as_secs_f64())
    });

    match &result {
        Ok(_) => tracing::debug!(operation, duration_ms = elapsed.as_millis(), "Upstream call succeeded"),
        Err(error) => tracing::warn!(
            operation,
            error = %error,
            duration_ms = elapsed.as_millis(),
            "Upstream call failed"
        ),
    }

    result
}
