//! Latest build artifact download.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::config::ForgeConfig;
use crate::error::{ApiError, ApiResult};
use crate::services::ArtifactProxy;
use crate::state::AppState;

/// GET /artifact - Newest build artifact as a zip download
#[utoipa::path(
    get,
    path = "/artifact",
    tag = "Artifacts",
    responses(
        (status = 200, description = "Zip archive", content_type = "application/zip", body = Vec<u8>),
        (status = 404, description = "No artifacts found", body = ApiError),
        (status = 503, description = "Source-control API unavailable", body = ApiError),
    ),
)]
pub async fn download_artifact(
    State(proxy): State<Arc<ArtifactProxy>>,
    State(config): State<Arc<ForgeConfig>>,
) -> ApiResult<Response> {
    let archive = proxy.latest_archive().await?;

    let disposition = format!("attachment; filename=\"{}\"", config.artifact_filename);
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ApiError::configuration_error(format!("Invalid artifact filename: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    )
        .into_response())
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/artifact", get(download_artifact))
}
