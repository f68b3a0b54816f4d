//! OpenAPI Specification for the TAGFORGE API
//!
//! Generated by utoipa from the response types and route annotations.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::build::DispatchResponse;
use crate::routes::builds::BuildsResponse;
use crate::routes::health::{HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{artifact, build, builds, health, tags};
use crate::telemetry::metrics;

use tagforge_core::{BuildRun, BuildStatus};

/// OpenAPI document for the TAGFORGE API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "TAGFORGE API",
        version = "0.1.0",
        description = "Release tags, build status, build dispatch and artifact download for a GitHub-built project",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:5000", description = "Local Development")
    ),
    tags(
        (name = "Builds", description = "Release tags, build status and dispatch"),
        (name = "Artifacts", description = "Build artifact download"),
        (name = "Health", description = "Liveness checks"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        tags::list_tags,
        builds::list_builds,
        build::request_build,
        artifact::download_artifact,
        health::ping,
        health::liveness,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError, ErrorCode,
            BuildRun, BuildStatus, BuildsResponse,
            DispatchResponse,
            HealthResponse, HealthStatus, HealthDetails
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
