#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::Router;
use tagforge_api::{create_api_router, ApiConfig, AppState, ForgeConfig};
use tagforge_test_utils::{ScriptedBuildSource, ScriptedTagSource};
use tower::ServiceExt;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub const PROJECT: &str = "aseprite";

pub struct TestApp {
    pub tags: Arc<ScriptedTagSource>,
    pub builds: Arc<ScriptedBuildSource>,
    pub state: AppState,
    pub router: Router,
}

pub fn api_config() -> ApiConfig {
    ApiConfig {
        rate_limit_enabled: false,
        ..ApiConfig::default()
    }
}

pub fn forge_config() -> ForgeConfig {
    ForgeConfig {
        project_name: PROJECT.to_string(),
        ..ForgeConfig::default()
    }
}

pub fn test_app(tags: ScriptedTagSource, builds: ScriptedBuildSource) -> TestApp {
    test_app_with(tags, builds, forge_config(), api_config())
}

pub fn test_app_with(
    tags: ScriptedTagSource,
    builds: ScriptedBuildSource,
    forge: ForgeConfig,
    api: ApiConfig,
) -> TestApp {
    let tags = Arc::new(tags);
    let builds = Arc::new(builds);
    let trust_proxy = api.trust_proxy_headers;
    let state = AppState::new(tags.clone(), builds.clone(), forge, trust_proxy);
    let router = create_api_router(state.clone(), &api);
    TestApp {
        tags,
        builds,
        state,
        router,
    }
}

pub fn client(last_octet: u8) -> SocketAddr {
    SocketAddr::from(([198, 51, 100, last_octet], 40_000))
}

pub fn get(uri: &str, from: SocketAddr) -> TestResult<Request<Body>> {
    let mut request = Request::builder().uri(uri).body(Body::empty())?;
    request.extensions_mut().insert(ConnectInfo(from));
    Ok(request)
}

pub fn post_build(body: impl Into<Body>, from: SocketAddr) -> TestResult<Request<Body>> {
    let mut request = Request::builder()
        .method("POST")
        .uri("/build")
        .header("content-type", "text/plain")
        .body(body.into())?;
    request.extensions_mut().insert(ConnectInfo(from));
    Ok(request)
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResult<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn json(&self, request: Request<Body>) -> TestResult<(u16, serde_json::Value)> {
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }
}
