//! Traits for the source-control API the service sits in front of.
//!
//! Two roles are split apart: the project repository whose tags are
//! listed, and the build repository whose workflow runs, artifacts and
//! dispatches are managed. A single client may implement both.

use async_trait::async_trait;
use bytes::Bytes;

use crate::entities::{RunArtifact, WorkflowRun};
use crate::error::UpstreamResult;

/// Source of release tag names for the upstream project.
#[async_trait]
pub trait TagSource: Send + Sync {
    /// All tag names, with every page of the listing drained.
    async fn list_tags(&self) -> UpstreamResult<Vec<String>>;
}

/// The repository hosting the build workflow.
#[async_trait]
pub trait BuildSource: Send + Sync {
    /// All runs of the build workflow, in upstream listing order.
    async fn list_workflow_runs(&self) -> UpstreamResult<Vec<WorkflowRun>>;

    /// Artifacts attached to one run.
    async fn list_run_artifacts(&self, run_id: u64) -> UpstreamResult<Vec<RunArtifact>>;

    /// Request a workflow run on `branch` with input `version`.
    ///
    /// `Ok(false)` means the upstream answered but declined the dispatch.
    async fn dispatch_workflow(&self, branch: &str, version: &str) -> UpstreamResult<bool>;

    /// Most recent unexpired artifact in the repository, if any.
    async fn latest_artifact(&self) -> UpstreamResult<Option<RunArtifact>>;

    /// Download an artifact's zip archive.
    async fn download_artifact(&self, artifact_id: u64) -> UpstreamResult<Bytes>;
}
