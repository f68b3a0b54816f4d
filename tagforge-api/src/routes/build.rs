//! Build dispatch.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tagforge_core::ForgeError;

use crate::error::{ApiError, ErrorCode};
use crate::middleware::{ClientAddress, RateLimitError};
use crate::services::BuildDispatcher;
use crate::state::AppState;

/// Outcome of a build request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DispatchResponse {
    fn ok(success: bool) -> Self {
        Self {
            success,
            message: None,
        }
    }

    fn refused(code: ErrorCode) -> Self {
        Self {
            success: false,
            message: Some(code.default_message().to_string()),
        }
    }
}

/// POST /build - Dispatch a build of the tag in the request body
///
/// The body is the bare tag name, e.g. `v1.3.2`. Unknown and already built
/// tags are answered with `200` and `success: false`.
#[utoipa::path(
    post,
    path = "/build",
    tag = "Builds",
    request_body(content = String, content_type = "text/plain", description = "Tag to build"),
    responses(
        (status = 200, description = "Dispatch result", body = DispatchResponse),
        (status = 429, description = "Daily build quota exhausted", body = ApiError),
        (status = 503, description = "Source-control API unavailable", body = ApiError),
    ),
)]
pub async fn request_build(
    State(dispatcher): State<Arc<BuildDispatcher>>,
    ClientAddress(client): ClientAddress,
    body: Bytes,
) -> Response {
    // A non UTF-8 body still counts against the quota.
    let tag = std::str::from_utf8(&body).unwrap_or_default();

    match dispatcher.dispatch(tag, &client).await {
        Ok(outcome) => Json(DispatchResponse::ok(outcome.is_accepted())).into_response(),
        Err(ForgeError::InvalidTag { .. }) => {
            Json(DispatchResponse::refused(ErrorCode::InvalidTag)).into_response()
        }
        Err(ForgeError::AlreadyBuilt { .. }) => {
            Json(DispatchResponse::refused(ErrorCode::AlreadyBuilt)).into_response()
        }
        Err(ForgeError::RateLimited { retry_after_secs }) => RateLimitError {
            retry_after: retry_after_secs,
        }
        .into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/build", post(request_build))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refused_message() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(DispatchResponse::refused(ErrorCode::InvalidTag))?;
        assert_eq!(json, serde_json::json!({"success": false, "message": "invalid tag"}));
        Ok(())
    }

    #[test]
    fn test_success_has_no_message() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(DispatchResponse::ok(true))?;
        assert_eq!(json, serde_json::json!({"success": true}));
        Ok(())
    }
}
