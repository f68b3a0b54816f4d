//! Build and upstream entity types.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// BUILD STATUS
// ============================================================================

/// Reported status of the newest build run for a version.
///
/// `Unknown` is the status a run carries before classification, and what
/// any unrecognised status string deserialises to. Every run that survives
/// classification ends up `InProgress`, `Completed` or `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    InProgress,
    Completed,
    /// Run completed but its artifacts are gone.
    Expired,
    #[default]
    #[serde(other)]
    Unknown,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Unknown => "unknown",
            BuildStatus::InProgress => "in_progress",
            BuildStatus::Completed => "completed",
            BuildStatus::Expired => "expired",
        }
    }

    /// Whether a new build for this version may be dispatched.
    pub fn allows_rebuild(&self) -> bool {
        matches!(self, BuildStatus::Expired)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a raw workflow-run status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Completed,
    Active,
    Other,
}

impl RunState {
    /// Classify a raw upstream status. `queued`, `waiting`, `pending` and
    /// `requested` runs are treated as active alongside `in_progress`.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some("completed") => RunState::Completed,
            Some("in_progress" | "queued" | "waiting" | "pending" | "requested") => {
                RunState::Active
            }
            _ => RunState::Other,
        }
    }
}

// ============================================================================
// BUILD RUN
// ============================================================================

/// Newest known build run for one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BuildRun {
    /// Run display name, e.g. `Build aseprite v1.3.2`.
    pub name: String,
    /// Version without the leading `v`.
    pub version: String,
    /// Run page on the source-control host.
    pub url: String,
    pub status: BuildStatus,
    /// Run creation time, unix seconds.
    pub created: i64,
}

// ============================================================================
// UPSTREAM DTOs
// ============================================================================

/// One workflow run as listed by the source-control API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
}

/// An artifact attached to a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub size_in_bytes: u64,
    #[serde(default)]
    pub archive_download_url: Option<String>,
}

/// A downloaded artifact archive held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactArchive {
    pub artifact_id: u64,
    pub name: String,
    pub bytes: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_status_serialization() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&BuildStatus::InProgress)?, "\"in_progress\"");
        assert_eq!(serde_json::to_string(&BuildStatus::Expired)?, "\"expired\"");
        let parsed: BuildStatus = serde_json::from_str("\"completed\"")?;
        assert_eq!(parsed, BuildStatus::Completed);
        Ok(())
    }

    #[test]
    fn test_unrecognised_status_deserialises_to_unknown() -> Result<(), serde_json::Error> {
        let parsed: BuildStatus = serde_json::from_str("\"cancelled\"")?;
        assert_eq!(parsed, BuildStatus::Unknown);
        let parsed: BuildStatus = serde_json::from_str("\"unknown\"")?;
        assert_eq!(parsed, BuildStatus::Unknown);
        Ok(())
    }

    #[test]
    fn test_build_status_default_is_unknown() {
        assert_eq!(BuildStatus::default(), BuildStatus::Unknown);
    }

    #[test]
    fn test_only_expired_allows_rebuild() {
        assert!(BuildStatus::Expired.allows_rebuild());
        assert!(!BuildStatus::Completed.allows_rebuild());
        assert!(!BuildStatus::InProgress.allows_rebuild());
        assert!(!BuildStatus::Unknown.allows_rebuild());
    }

    #[test]
    fn test_run_state_from_raw() {
        assert_eq!(RunState::from_raw(Some("completed")), RunState::Completed);
        assert_eq!(RunState::from_raw(Some("in_progress")), RunState::Active);
        assert_eq!(RunState::from_raw(Some("queued")), RunState::Active);
        assert_eq!(RunState::from_raw(Some("cancelled")), RunState::Other);
        assert_eq!(RunState::from_raw(None), RunState::Other);
    }

    #[test]
    fn test_workflow_run_deserialize() -> Result<(), serde_json::Error> {
        let run: WorkflowRun = serde_json::from_value(serde_json::json!({
            "id": 42,
            "name": "Build aseprite v1.3.2",
            "status": "completed",
            "html_url": "https://github.com/o/r/actions/runs/42",
            "created_at": "2024-05-01T12:00:00Z",
            "conclusion": "success"
        }))?;
        assert_eq!(run.id, 42);
        assert_eq!(run.name.as_deref(), Some("Build aseprite v1.3.2"));
        assert_eq!(run.created_at.timestamp(), 1_714_564_800);
        Ok(())
    }

    #[test]
    fn test_build_run_serialization_shape() -> Result<(), serde_json::Error> {
        let run = BuildRun {
            name: "Build aseprite v1.0.0".to_string(),
            version: "1.0.0".to_string(),
            url: "https://example.invalid/runs/1".to_string(),
            status: BuildStatus::Completed,
            created: 1_700_000_000,
        };
        let value = serde_json::to_value(&run)?;
        assert_eq!(value["status"], "completed");
        assert_eq!(value["created"], 1_700_000_000);
        assert_eq!(value["version"], "1.0.0");
        Ok(())
    }
}
