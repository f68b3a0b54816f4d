//! Per-version build status.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::services::{BuildStatusAggregator, BuildsByTag};
use crate::state::AppState;

/// Latest build per tag, keyed `"v<version>"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "openapi", schema(value_type = std::collections::BTreeMap<String, tagforge_core::BuildRun>))]
#[serde(transparent)]
pub struct BuildsResponse(pub BuildsByTag);

/// GET /builds - Latest build status per version
#[utoipa::path(
    get,
    path = "/builds",
    tag = "Builds",
    responses(
        (status = 200, description = "Latest build run per tag", body = BuildsResponse),
        (status = 503, description = "Source-control API unavailable", body = ApiError),
    ),
)]
pub async fn list_builds(
    State(builds): State<Arc<BuildStatusAggregator>>,
) -> ApiResult<Json<BuildsResponse>> {
    Ok(Json(BuildsResponse(builds.get_latest_builds().await?)))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/builds", get(list_builds))
}
