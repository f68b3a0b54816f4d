//! Per-version build status, derived from the build workflow's run history.

use std::collections::BTreeMap;
use std::sync::Arc;

use tagforge_core::{BuildRun, BuildSource, BuildStatus, ForgeResult, RunState, WorkflowRun};

use super::observe_upstream;

/// Latest build run per tag, keyed `"v<version>"`.
pub type BuildsByTag = BTreeMap<String, BuildRun>;

/// Reduces the build workflow's runs to one status per version.
///
/// Only runs named `Build <project> v<version>` are considered. Among runs
/// for the same version, the one enumerated last by the upstream listing
/// wins. Runs whose raw status is neither completed nor active are ignored
/// and never displace an earlier entry. Nothing is cached.
pub struct BuildStatusAggregator {
    source: Arc<dyn BuildSource>,
    run_prefix: String,
}

impl BuildStatusAggregator {
    pub fn new(source: Arc<dyn BuildSource>, project_name: &str) -> Self {
        Self {
            source,
            run_prefix: format!("Build {} v", project_name),
        }
    }

    /// Version encoded in a run name, if the name follows the convention.
    pub fn run_version<'a>(&self, run_name: &'a str) -> Option<&'a str> {
        run_name
            .strip_prefix(self.run_prefix.as_str())
            .filter(|version| !version.is_empty())
    }

    /// Latest build per tag.
    ///
    /// Runs are walked newest-enumerated first so that only the run that
    /// ends up in the result has its artifacts fetched.
    pub async fn get_latest_builds(&self) -> ForgeResult<BuildsByTag> {
        let runs = observe_upstream("list_workflow_runs", self.source.list_workflow_runs()).await?;
        let total = runs.len();
        let mut builds = BuildsByTag::new();

        for run in runs.iter().rev() {
            let Some(version) = run.name.as_deref().and_then(|name| self.run_version(name)) else {
                continue;
            };
            let key = format!("v{}", version);
            if builds.contains_key(&key) {
                continue;
            }
            let Some(status) = self.classify(run).await? else {
                continue;
            };
            builds.insert(
                key,
                BuildRun {
                    name: run.name.clone().unwrap_or_default(),
                    version: version.to_string(),
                    url: run.html_url.clone(),
                    status,
                    created: run.created_at.timestamp(),
                },
            );
        }

        tracing::debug!(runs = total, versions = builds.len(), "Aggregated build status");
        Ok(builds)
    }

    /// Latest build for one tag.
    pub async fn latest_for(&self, tag: &str) -> ForgeResult<Option<BuildRun>> {
        Ok(self.get_latest_builds().await?.remove(tag))
    }

    /// `None` means the run is skipped.
    async fn classify(&self, run: &WorkflowRun) -> ForgeResult<Option<BuildStatus>> {
        let status = match RunState::from_raw(run.status.as_deref()) {
            RunState::Completed => {
                let artifacts =
                    observe_upstream("list_run_artifacts", self.source.list_run_artifacts(run.id))
                        .await?;
                // Expired covers an empty list and a list whose artifacts
                // are all marked expired.
                if artifacts.iter().any(|artifact| !artifact.expired) {
                    BuildStatus::Completed
                } else {
                    BuildStatus::Expired
                }
            }
            RunState::Active => BuildStatus::InProgress,
            RunState::Other => return Ok(None),
        };
        Ok(Some(status))
    }
}

impl std::fmt::Debug for BuildStatusAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildStatusAggregator")
            .field("run_prefix", &self.run_prefix)
            .finish_non_exhaustive()
    }
}
