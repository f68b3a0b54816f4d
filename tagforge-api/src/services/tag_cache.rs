//! Cached release tag list.

use std::sync::Arc;
use std::time::Duration;

use tagforge_core::{sort_descending, CacheOutcome, ForgeResult, TagSource, TtlCache};

use super::observe_upstream;
use crate::telemetry::metrics::with_metrics;

const CACHE_LABEL: &str = "tags";

/// Upstream tag names filtered to semantic versions, newest first, cached
/// for a fixed TTL.
///
/// Refreshes are single-flight: callers arriving while a refresh runs wait
/// for it. A failed refresh serves the previous list if there is one.
pub struct TagCache {
    source: Arc<dyn TagSource>,
    cache: TtlCache<Arc<Vec<String>>>,
}

impl TagCache {
    pub fn new(source: Arc<dyn TagSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: TtlCache::new(ttl),
        }
    }

    /// Sorted, filtered tag names.
    pub async fn get_tags(&self) -> ForgeResult<Arc<Vec<String>>> {
        let source = &self.source;
        let result = self
            .cache
            .get_or_refresh(move || async move {
                let names = observe_upstream("list_tags", source.list_tags()).await?;
                let fetched = names.len();
                let sorted = sort_descending(names);
                tracing::info!(fetched, retained = sorted.len(), "Refreshed tag cache");
                Ok(Arc::new(sorted))
            })
            .await;

        match result {
            Ok(read) => {
                let outcome = match read.outcome() {
                    CacheOutcome::Hit => "hit",
                    CacheOutcome::Refreshed => "refreshed",
                    CacheOutcome::Stale { error } => {
                        tracing::warn!(
                            error = %error,
                            age_secs = read.age().as_secs(),
                            "Tag refresh failed, serving stale list"
                        );
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

    /// Whether `tag` is one of the cached release tags.
    pub async fn contains(&self, tag: &str) -> ForgeResult<bool> {
        Ok(self.get_tags().await?.iter().any(|name| name == tag))
    }

    /// Drop the cached list; the next read refetches.
    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
        tracing::debug!("Tag cache invalidated");
    }
}

impl std::fmt::Debug for TagCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagCache")
            .field("ttl", &self.cache.ttl())
            .finish_non_exhaustive()
    }
}
