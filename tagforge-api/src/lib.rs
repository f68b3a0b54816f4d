//! TAGFORGE API - HTTP façade over GitHub for release builds
//!
//! Lists the upstream project's release tags, reports build status per
//! version, dispatches new builds under a per-client daily quota and proxies
//! the newest build artifact. Everything is served by one Axum router.

pub mod config;
pub mod error;
pub mod macros;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ApiConfig, ForgeConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{spawn_limiter_pruner, ClientAddress, ClientIpPolicy, RateLimitState};
pub use openapi::ApiDoc;
pub use routes::{create_api_router, RouterBuilder};
pub use services::{
    spawn_quota_pruner, ArtifactProxy, BuildDispatcher, BuildStatusAggregator, DispatchOutcome,
    DispatchQuota, TagCache,
};
pub use state::AppState;
