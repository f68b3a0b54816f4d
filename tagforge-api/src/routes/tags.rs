//! Release tag listing.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::error::{ApiError, ApiResult};
use crate::services::TagCache;
use crate::state::AppState;

/// GET /tags - Release tags, newest first
#[utoipa::path(
    get,
    path = "/tags",
    tag = "Builds",
    responses(
        (status = 200, description = "Semantic-version tags in descending order", body = Vec<String>),
        (status = 503, description = "Source-control API unavailable and nothing cached", body = ApiError),
    ),
)]
pub async fn list_tags(State(tags): State<Arc<TagCache>>) -> ApiResult<Json<Vec<String>>> {
    let tags = tags.get_tags().await?;
    Ok(Json(tags.as_ref().clone()))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/tags", get(list_tags))
}
