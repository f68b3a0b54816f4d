//! TAGFORGE API Server Entry Point
//!
//! Bootstraps configuration, wires the GitHub client into the services and
//! starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tagforge_api::telemetry::{init_tracing, TelemetryConfig};
use tagforge_api::{
    spawn_limiter_pruner, spawn_quota_pruner, ApiConfig, ApiError, ApiResult, AppState,
    ForgeConfig, RouterBuilder,
};
use tagforge_github::{GithubClient, GithubConfig};

const QUOTA_PRUNE_INTERVAL: Duration = Duration::from_secs(3600);
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    // A missing GITHUB_PAT stops startup here.
    let github_config = GithubConfig::from_env()?;
    let forge_config = ForgeConfig::from_env()?;
    let api_config = ApiConfig::from_env();

    tracing::info!(
        project_repo = %github_config.project_repository,
        build_repo = %github_config.build_repository,
        workflow = %github_config.workflow,
        branch = %forge_config.branch,
        "Configuration loaded"
    );

    let github = Arc::new(GithubClient::new(github_config)?);
    let state = AppState::new(
        github.clone(),
        github,
        forge_config,
        api_config.trust_proxy_headers,
    );
    let quota_pruner = spawn_quota_pruner(state.quota.clone(), QUOTA_PRUNE_INTERVAL);

    let builder = RouterBuilder::new(state, api_config);
    let limiter_pruner = spawn_limiter_pruner(builder.rate_limit_state(), LIMITER_PRUNE_INTERVAL);
    let app = builder.build();

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting TAGFORGE API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    quota_pruner.abort();
    limiter_pruner.abort();
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("TAGFORGE_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("TAGFORGE_API_PORT").ok())
        .unwrap_or_else(|| "5000".to_string());
    let port = port_str.parse::<u16>().map_err(|_| {
        ApiError::invalid_input(format!("Invalid port value: {}", port_str))
    })?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}
