//! Cached download of the build repository's newest artifact.

use std::sync::Arc;
use std::time::Duration;

use tagforge_core::{
    ArtifactArchive, BuildSource, CacheOutcome, ForgeError, ForgeResult, TtlCache,
};

use super::observe_upstream;
use crate::telemetry::metrics::with_metrics;

const CACHE_LABEL: &str = "artifact";

/// Serves the most recent unexpired artifact archive, cached in memory for
/// a fixed TTL with the same single-flight and stale-on-failure rules as
/// the tag cache.
pub struct ArtifactProxy {
    source: Arc<dyn BuildSource>,
    cache: TtlCache<ArtifactArchive>,
}

impl ArtifactProxy {
    pub fn new(source: Arc<dyn BuildSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: TtlCache::new(ttl),
        }
    }

    /// Newest archive, or `NotFound` when the repository has no unexpired
    /// artifact and nothing is cached.
    pub async fn latest_archive(&self) -> ForgeResult<ArtifactArchive> {
        let source = &self.source;
        let result = self
            .cache
            .get_or_refresh(move || async move {
                let artifact = observe_upstream("latest_artifact", source.latest_artifact())
                    .await?
                    .ok_or_else(|| ForgeError::NotFound {
                        what: "artifact".to_string(),
                    })?;
                let bytes =
                    observe_upstream("download_artifact", source.download_artifact(artifact.id))
                        .await?;
                tracing::info!(
                    artifact_id = artifact.id,
                    name = %artifact.name,
                    size = bytes.len(),
                    "Downloaded build artifact"
                );
                Ok(ArtifactArchive {
                    artifact_id: artifact.id,
                    name: artifact.name,
                    bytes,
                })
            })
            .await;

        match result {
            Ok(read) => {
                let outcome = match read.outcome() {
                    CacheOutcome::Hit => "hit",
                    CacheOutcome::Refreshed => "refreshed",
                    CacheOutcome::Stale { error } => {
                        tracing::warn!(error = %error, "Artifact refresh failed, serving cached archive");
                        "stale"
                    }
                };
                with_metrics(|metrics| metrics.record_cache_read(CACHE_LABEL, outcome));
                Ok(read.into_value())
            }
            Err(error) => {
                with_metrics(|metrics| metrics.record_cache_read(CACHE_LABEL, "error"));
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for ArtifactProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactProxy")
            .field("ttl", &self.cache.ttl())
            .finish_non_exhaustive()
    }
}
