//! REST API Routes Module
//!
//! - /tags, /builds, /build: release tags, build status and dispatch
//! - /artifact: latest build artifact download
//! - /health/*: liveness checks
//! - /metrics, /openapi.json: observability and API documentation

pub mod artifact;
pub mod build;
pub mod builds;
pub mod health;
pub mod tags;

use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::middleware::{rate_limit_middleware, RateLimitState};
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// ROUTER BUILDER
// ============================================================================

/// Assembles the routes and wraps them in the hardening layers.
pub struct RouterBuilder {
    state: AppState,
    api_config: ApiConfig,
    rate_limit_state: RateLimitState,
}

impl RouterBuilder {
    pub fn new(state: AppState, api_config: ApiConfig) -> Self {
        let rate_limit_state = RateLimitState::new(api_config.clone());
        Self {
            state,
            api_config,
            rate_limit_state,
        }
    }

    /// Handle to the flood limiter the built router will use.
    pub fn rate_limit_state(&self) -> RateLimitState {
        self.rate_limit_state.clone()
    }

    /// Service routes, before any layer is applied.
    fn build_service_routes(&self) -> Router<AppState> {
        Router::new()
            .merge(tags::create_router())
            .merge(builds::create_router())
            .merge(build::create_router())
            .merge(artifact::create_router())
            .nest("/health", health::create_router())
    }

    /// Build the complete router.
    ///
    /// # Middleware Order (outer to inner)
    /// 1. CORS (outermost) - handles preflight requests
    /// 2. Observability - tracing and metrics
    /// 3. Rate Limiting - rejects floods before any handler runs
    pub fn build(self) -> Router {
        let router = self
            .build_service_routes()
            .route("/metrics", get(metrics_handler))
            .route("/openapi.json", get(openapi_json))
            .with_state(self.state);

        let cors = build_cors_layer(&self.api_config);

        router
            .layer(from_fn_with_state(self.rate_limit_state, rate_limit_middleware))
            .layer(from_fn(observability_middleware))
            .layer(cors)
    }
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// With no configured origins every origin is allowed.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("retry-after"),
            header::CONTENT_DISPOSITION,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

/// Create the complete API router.
///
/// - /tags, /builds, /build, /artifact
/// - /health/ping, /health/live
/// - /metrics (Prometheus text format)
/// - /openapi.json
///
/// CORS, request observability and the per-IP flood limiter apply to every
/// route. Serve with `into_make_service_with_connect_info::<SocketAddr>()`
/// so clients are identified by their socket address.
pub fn create_api_router(state: AppState, api_config: &ApiConfig) -> Router {
    RouterBuilder::new(state, api_config.clone()).build()
}
