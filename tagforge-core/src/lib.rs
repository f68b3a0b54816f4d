//! TAGFORGE Core - shared types for the release build façade
//!
//! Holds the pieces every other crate leans on:
//! - build and upstream entity types
//! - error types
//! - semantic-version filtering of tag names
//! - a single-flight TTL cache
//! - traits describing the source-control API

pub mod cache;
pub mod entities;
pub mod error;
pub mod upstream;
pub mod version;

pub use cache::{CacheEntry, CacheOutcome, CacheRead, TtlCache};
pub use entities::{ArtifactArchive, BuildRun, BuildStatus, RunArtifact, RunState, WorkflowRun};
pub use error::{ConfigError, ForgeError, ForgeResult, UpstreamError, UpstreamResult};
pub use upstream::{BuildSource, TagSource};
pub use version::{is_valid_version, sort_descending, strip_v_prefix, Tag};
