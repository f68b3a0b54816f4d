//! TAGFORGE Test Utilities
//!
//! Shared test infrastructure for the tagforge workspace:
//! - Scripted, call-counting fakes for the upstream traits
//! - Proptest generators for tag names and run statuses
//! - Fixtures for workflow runs and artifacts
//! - Assertions on `ForgeError` variants

pub use tagforge_core::{
    BuildRun, BuildSource, BuildStatus, ForgeError, ForgeResult, RunArtifact, TagSource,
    UpstreamError, UpstreamResult, WorkflowRun,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// SCRIPTED UPSTREAMS
// ============================================================================

/// Tag source returning a fixed list and counting calls.
#[derive(Debug, Default)]
pub struct ScriptedTagSource {
    tags: Mutex<Vec<String>>,
    failing: AtomicBool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedTagSource {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: Mutex::new(tags.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Sleep this long inside every `list_tags` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_tags<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *lock(&self.tags) = tags.into_iter().map(Into::into).collect();
    }

    /// Make subsequent calls fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `list_tags` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagSource for ScriptedTagSource {
    async fn list_tags(&self) -> UpstreamResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(fixtures::transport_failure("list_tags"));
        }
        Ok(lock(&self.tags).clone())
    }
}

/// Build repository fake: scripted runs, per-run artifacts, recorded
/// dispatches and a downloadable archive.
#[derive(Debug)]
pub struct ScriptedBuildSource {
    runs: Mutex<Vec<WorkflowRun>>,
    artifacts: Mutex<HashMap<u64, Vec<RunArtifact>>>,
    dispatch_result: Mutex<UpstreamResult<bool>>,
    dispatch_delay: Option<Duration>,
    dispatches: Mutex<Vec<(String, String)>>,
    latest: Mutex<Option<RunArtifact>>,
    archive: Mutex<Bytes>,
    failing: AtomicBool,
    run_list_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl Default for ScriptedBuildSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBuildSource {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            artifacts: Mutex::new(HashMap::new()),
            dispatch_result: Mutex::new(Ok(true)),
            dispatch_delay: None,
            dispatches: Mutex::new(Vec::new()),
            latest: Mutex::new(None),
            archive: Mutex::new(Bytes::new()),
            failing: AtomicBool::new(false),
            run_list_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
        }
    }

    /// Append a run with its artifact list (builder form).
    pub fn with_run(self, run: WorkflowRun, artifacts: Vec<RunArtifact>) -> Self {
        self.push_run(run, artifacts);
        self
    }

    /// Sleep this long inside every dispatch call.
    pub fn with_dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = Some(delay);
        self
    }

    pub fn push_run(&self, run: WorkflowRun, artifacts: Vec<RunArtifact>) {
        lock(&self.artifacts).insert(run.id, artifacts);
        lock(&self.runs).push(run);
    }

    pub fn set_dispatch_result(&self, result: UpstreamResult<bool>) {
        *lock(&self.dispatch_result) = result;
    }

    /// Make run listing fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latest_artifact(&self, artifact: Option<RunArtifact>, archive: Bytes) {
        *lock(&self.latest) = artifact;
        *lock(&self.archive) = archive;
    }

    /// Recorded `(branch, version)` dispatch calls.
    pub fn dispatches(&self) -> Vec<(String, String)> {
        lock(&self.dispatches).clone()
    }

    pub fn dispatch_count(&self) -> usize {
        lock(&self.dispatches).len()
    }

    pub fn run_list_calls(&self) -> usize {
        self.run_list_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildSource for ScriptedBuildSource {
    async fn list_workflow_runs(&self) -> UpstreamResult<Vec<WorkflowRun>> {
        self.run_list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(fixtures::transport_failure("list_workflow_runs"));
        }
        Ok(lock(&self.runs).clone())
    }

    async fn list_run_artifacts(&self, run_id: u64) -> UpstreamResult<Vec<RunArtifact>> {
        Ok(lock(&self.artifacts).get(&run_id).cloned().unwrap_or_default())
    }

    async fn dispatch_workflow(&self, branch: &str, version: &str) -> UpstreamResult<bool> {
        lock(&self.dispatches).push((branch.to_string(), version.to_string()));
        if let Some(delay) = self.dispatch_delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.dispatch_result).clone()
    }

    async fn latest_artifact(&self) -> UpstreamResult<Option<RunArtifact>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(fixtures::transport_failure("latest_artifact"));
        }
        Ok(lock(&self.latest).clone())
    }

    async fn download_artifact(&self, _artifact_id: u64) -> UpstreamResult<Bytes> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(fixtures::transport_failure("download_artifact"));
        }
        Ok(lock(&self.archive).clone())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for tag names and upstream statuses.

    use proptest::prelude::*;

    /// A `major.minor.patch` core without prefix.
    pub fn arb_version_core() -> impl Strategy<Value = String> {
        (0u64..50, 0u64..50, 0u64..200)
            .prop_map(|(major, minor, patch)| format!("{}.{}.{}", major, minor, patch))
    }

    /// A pre-release suffix such as `-beta.3`, or nothing.
    pub fn arb_prerelease() -> impl Strategy<Value = String> {
        prop_oneof![
            3 => Just(String::new()),
            1 => (prop_oneof![Just("alpha"), Just("beta"), Just("rc")], 0u32..10)
                .prop_map(|(label, n)| format!("-{}.{}", label, n)),
        ]
    }

    /// A valid tag name, with or without a leading `v`.
    pub fn arb_valid_tag() -> impl Strategy<Value = String> {
        (any::<bool>(), arb_version_core(), arb_prerelease()).prop_map(|(prefixed, core, pre)| {
            format!("{}{}{}", if prefixed { "v" } else { "" }, core, pre)
        })
    }

    /// Tag names that are never semantic versions.
    pub fn arb_garbage_tag() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z]{1,12}".prop_map(|s| s),
            (0u64..50, 0u64..50).prop_map(|(a, b)| format!("v{}.{}", a, b)),
            arb_version_core().prop_map(|core| format!("vv{}", core)),
            arb_version_core().prop_map(|core| format!("release-{}", core)),
        ]
    }

    /// A mix of valid and invalid tag names.
    pub fn arb_tag_list() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(prop_oneof![3 => arb_valid_tag(), 1 => arb_garbage_tag()], 0..40)
    }

    /// Raw workflow-run statuses as GitHub reports them.
    pub fn arb_raw_status() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(Some("completed".to_string())),
            Just(Some("in_progress".to_string())),
            Just(Some("queued".to_string())),
            Just(Some("cancelled".to_string())),
            Just(Some("failure".to_string())),
            Just(None),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built upstream records for common scenarios.

    use super::*;
    use chrono::{DateTime, Utc};

    /// Base creation time for fixture runs (2023-11-14T22:13:20Z).
    pub const BASE_CREATED: i64 = 1_700_000_000;

    /// `Build <project> v<version>`
    pub fn build_run_name(project: &str, version: &str) -> String {
        format!("Build {} v{}", project, version)
    }

    /// A workflow run created `id` seconds after [`BASE_CREATED`].
    pub fn workflow_run(id: u64, name: &str, status: &str) -> WorkflowRun {
        let created_at = DateTime::<Utc>::from_timestamp(BASE_CREATED + id as i64, 0)
            .unwrap_or_else(Utc::now);
        WorkflowRun {
            id,
            name: Some(name.to_string()),
            status: Some(status.to_string()),
            html_url: format!("https://github.com/owner/builds/actions/runs/{}", id),
            created_at,
        }
    }

    pub fn run_artifact(id: u64, expired: bool) -> RunArtifact {
        RunArtifact {
            id,
            name: format!("artifact-{}", id),
            expired,
            size_in_bytes: 1024,
            archive_download_url: Some(format!(
                "https://api.github.com/repos/owner/builds/actions/artifacts/{}/zip",
                id
            )),
        }
    }

    pub fn transport_failure(operation: &str) -> UpstreamError {
        UpstreamError::Transport {
            operation: operation.to_string(),
            reason: "connection refused".to_string(),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on `ForgeResult` variants.

    use super::*;

    #[track_caller]
    pub fn assert_upstream_unavailable<T: std::fmt::Debug>(result: &ForgeResult<T>) {
        match result {
            Err(ForgeError::UpstreamUnavailable(_)) => {}
            other => panic!("Expected UpstreamUnavailable, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_tag<T: std::fmt::Debug>(result: &ForgeResult<T>) {
        match result {
            Err(ForgeError::InvalidTag { .. }) => {}
            other => panic!("Expected InvalidTag, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_already_built<T: std::fmt::Debug>(result: &ForgeResult<T>) {
        match result {
            Err(ForgeError::AlreadyBuilt { .. }) => {}
            other => panic!("Expected AlreadyBuilt, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_rate_limited<T: std::fmt::Debug>(result: &ForgeResult<T>) {
        match result {
            Err(ForgeError::RateLimited { .. }) => {}
            other => panic!("Expected RateLimited, got: {:?}", other),
        }
    }
}
