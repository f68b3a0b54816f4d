//! GitHub REST client.
//!
//! Implements [`TagSource`] against the project repository and
//! [`BuildSource`] against the build repository. Every listing is paged
//! through until the upstream returns a short page.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tagforge_core::{
    BuildSource, ConfigError, RunArtifact, TagSource, UpstreamError, UpstreamResult, WorkflowRun,
};

use crate::config::GithubConfig;

/// Page size requested from every listing endpoint (GitHub's maximum).
pub const PER_PAGE: usize = 100;

/// Upper bound on pages walked for a single listing.
const MAX_PAGES: u32 = 1_000;

/// How many recent repository artifacts to scan for an unexpired one.
const LATEST_ARTIFACT_SCAN: usize = 30;

const USER_AGENT: &str = concat!("tagforge/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct TagRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsPage {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct ArtifactsPage {
    #[serde(default)]
    artifacts: Vec<RunArtifact>,
}

#[derive(Debug, Deserialize)]
struct GithubErrorBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    inputs: DispatchInputs<'a>,
}

#[derive(Debug, Serialize)]
struct DispatchInputs<'a> {
    version: &'a str,
}

// ============================================================================
// CLIENT
// ============================================================================

/// GitHub API client shared by all request handlers.
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    api_url: String,
    project_repository: String,
    build_repository: String,
    workflow: String,
}

impl GithubClient {
    /// Build a client with authentication and timeout baked in.
    pub fn new(config: GithubConfig) -> Result<Self, ConfigError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token.expose()))
            .map_err(|e| ConfigError::InvalidValue {
                field: "GITHUB_PAT".to_string(),
                value: "[REDACTED]".to_string(),
                reason: e.to_string(),
            })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http_client".to_string(),
                value: USER_AGENT.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            project_repository: config.project_repository,
            build_repository: config.build_repository,
            workflow: config.workflow,
        })
    }

    fn repo_url(&self, repository: &str, path: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, repository, path)
    }

    fn build_url(&self, path: &str) -> String {
        self.repo_url(&self.build_repository, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> UpstreamResult<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;
        let response = ensure_success(operation, response).await?;
        response.json::<T>().await.map_err(|e| transport_error(operation, e))
    }
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("api_url", &self.api_url)
            .field("project_repository", &self.project_repository)
            .field("build_repository", &self.build_repository)
            .field("workflow", &self.workflow)
            .finish()
    }
}

#[async_trait]
impl TagSource for GithubClient {
    async fn list_tags(&self) -> UpstreamResult<Vec<String>> {
        let url = self.repo_url(&self.project_repository, "tags");
        let mut names = Vec::new();

        for page in 1..=MAX_PAGES {
            let batch: Vec<TagRef> = self.get_json("list_tags", &url, &page_query(page)).await?;
            let received = batch.len();
            names.extend(batch.into_iter().map(|tag| tag.name));
            if is_last_page(received) {
                tracing::debug!(count = names.len(), pages = page, "Listed upstream tags");
                return Ok(names);
            }
        }

        Err(pagination_overflow("list_tags"))
    }
}

#[async_trait]
impl BuildSource for GithubClient {
    async fn list_workflow_runs(&self) -> UpstreamResult<Vec<WorkflowRun>> {
        let url = self.build_url(&format!("actions/workflows/{}/runs", self.workflow));
        let mut runs = Vec::new();

        for page in 1..=MAX_PAGES {
            let batch: WorkflowRunsPage = self
                .get_json("list_workflow_runs", &url, &page_query(page))
                .await?;
            let received = batch.workflow_runs.len();
            runs.extend(batch.workflow_runs);
            if is_last_page(received) || runs.len() as u64 >= batch.total_count {
                tracing::debug!(count = runs.len(), pages = page, "Listed workflow runs");
                return Ok(runs);
            }
        }

        Err(pagination_overflow("list_workflow_runs"))
    }

    async fn list_run_artifacts(&self, run_id: u64) -> UpstreamResult<Vec<RunArtifact>> {
        let url = self.build_url(&format!("actions/runs/{}/artifacts", run_id));
        let page: ArtifactsPage = self
            .get_json("list_run_artifacts", &url, &[("per_page", PER_PAGE.to_string())])
            .await?;
        Ok(page.artifacts)
    }

    async fn dispatch_workflow(&self, branch: &str, version: &str) -> UpstreamResult<bool> {
        const OPERATION: &str = "dispatch_workflow";
        let url = self.build_url(&format!("actions/workflows/{}/dispatches", self.workflow));
        let body = DispatchRequest {
            git_ref: branch,
            inputs: DispatchInputs { version },
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(OPERATION, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }

        let text = response.text().await.unwrap_or_default();
        tracing::warn!(
            status = status.as_u16(),
            message = %error_message(&text),
            branch,
            version,
            "Workflow dispatch declined"
        );
        Ok(false)
    }

    async fn latest_artifact(&self) -> UpstreamResult<Option<RunArtifact>> {
        let url = self.build_url("actions/artifacts");
        let page: ArtifactsPage = self
            .get_json(
                "latest_artifact",
                &url,
                &[("per_page", LATEST_ARTIFACT_SCAN.to_string())],
            )
            .await?;
        Ok(page.artifacts.into_iter().find(|artifact| !artifact.expired))
    }

    async fn download_artifact(&self, artifact_id: u64) -> UpstreamResult<Bytes> {
        const OPERATION: &str = "download_artifact";
        let url = self.build_url(&format!("actions/artifacts/{}/zip", artifact_id));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(OPERATION, e))?;
        let response = ensure_success(OPERATION, response).await?;
        response.bytes().await.map_err(|e| transport_error(OPERATION, e))
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn page_query(page: u32) -> [(&'static str, String); 2] {
    [("per_page", PER_PAGE.to_string()), ("page", page.to_string())]
}

/// A page shorter than [`PER_PAGE`] is the final one.
fn is_last_page(received: usize) -> bool {
    received < PER_PAGE
}

fn pagination_overflow(operation: &str) -> UpstreamError {
    UpstreamError::Decode {
        operation: operation.to_string(),
        reason: format!("listing did not end within {} pages", MAX_PAGES),
    }
}

fn transport_error(operation: &str, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout {
            operation: operation.to_string(),
        }
    } else if err.is_decode() {
        UpstreamError::Decode {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    } else {
        UpstreamError::Transport {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

async fn ensure_success(operation: &str, response: Response) -> UpstreamResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(status_error(operation, status.as_u16(), &text))
}

/// Map a non-2xx response to an [`UpstreamError::Status`].
pub fn status_error(operation: &str, status: u16, body: &str) -> UpstreamError {
    UpstreamError::Status {
        operation: operation.to_string(),
        status,
        message: error_message(body),
    }
}

/// GitHub wraps errors as `{"message": ...}`; fall back to a trimmed body.
fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<GithubErrorBody>(body) {
        return parsed.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}
