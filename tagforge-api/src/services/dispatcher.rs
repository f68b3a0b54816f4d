//! Validated build dispatch.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tagforge_core::{BuildSource, ForgeError, ForgeResult};
use tokio::time::Instant;

use super::{observe_upstream, BuildStatusAggregator, DispatchQuota, TagCache};
use crate::telemetry::metrics::with_metrics;

/// Result of a dispatch that reached the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The upstream accepted the workflow dispatch.
    Accepted,
    /// The upstream answered but did not accept it.
    Declined,
}

impl DispatchOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, DispatchOutcome::Accepted)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingDispatch {
    since: Instant,
    accepted: bool,
}

/// A tag marked pending for the lifetime of one dispatch attempt.
///
/// Dropping the claim without committing it releases the tag, which covers
/// failed and declined dispatches as well as a cancelled request future.
struct PendingClaim<'a> {
    pending: &'a DashMap<String, PendingDispatch>,
    tag: String,
    committed: bool,
}

impl PendingClaim<'_> {
    /// Keep the tag blocked for the grace window, starting now.
    fn commit(mut self) {
        self.pending.insert(
            self.tag.clone(),
            PendingDispatch {
                since: Instant::now(),
                accepted: true,
            },
        );
        self.committed = true;
    }
}

impl Drop for PendingClaim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.pending.remove(&self.tag);
        }
    }
}

/// Triggers builds for known release tags that have no live build.
///
/// Order of checks for every request: client quota, tag validity, existing
/// build, in-process pending dispatch. Only a request passing all four
/// reaches the upstream dispatch endpoint, exactly once and without retry.
pub struct BuildDispatcher {
    source: Arc<dyn BuildSource>,
    tags: Arc<TagCache>,
    builds: Arc<BuildStatusAggregator>,
    quota: Arc<DispatchQuota>,
    branch: String,
    grace: Duration,
    pending: DashMap<String, PendingDispatch>,
}

impl BuildDispatcher {
    pub fn new(
        source: Arc<dyn BuildSource>,
        tags: Arc<TagCache>,
        builds: Arc<BuildStatusAggregator>,
        quota: Arc<DispatchQuota>,
        branch: impl Into<String>,
        grace: Duration,
    ) -> Self {
        Self {
            source,
            tags,
            builds,
            quota,
            branch: branch.into(),
            grace,
            pending: DashMap::new(),
        }
    }

    /// Dispatch a build of `tag` on behalf of `client_id`.
    ///
    /// The upstream `version` input is the tag exactly as requested, leading
    /// "v" included.
    pub async fn dispatch(&self, tag: &str, client_id: &str) -> ForgeResult<DispatchOutcome> {
        let result = self.try_dispatch(tag.trim(), client_id).await;
        let label = match &result {
            Ok(DispatchOutcome::Accepted) => "accepted",
            Ok(DispatchOutcome::Declined) => "declined",
            Err(ForgeError::InvalidTag { .. }) => "invalid_tag",
            Err(ForgeError::AlreadyBuilt { .. }) => "already_built",
            Err(ForgeError::RateLimited { .. }) => "rate_limited",
            Err(_) => "error",
        };
        with_metrics(|metrics| metrics.record_dispatch(label));

        match &result {
            Ok(_) => tracing::info!(tag, client = client_id, outcome = label, "Build dispatch finished"),
            Err(ForgeError::UpstreamUnavailable(_)) => {
                tracing::warn!(tag, client = client_id, "Build dispatch failed upstream")
            }
            Err(error) => tracing::info!(tag, client = client_id, error = %error, "Build dispatch refused"),
        }
        result
    }

    async fn try_dispatch(&self, tag: &str, client_id: &str) -> ForgeResult<DispatchOutcome> {
        self.quota
            .allow(client_id)
            .map_err(|exceeded| ForgeError::RateLimited {
                retry_after_secs: exceeded.retry_after_secs,
            })?;

        if tag.is_empty() || !self.tags.contains(tag).await? {
            return Err(ForgeError::InvalidTag {
                tag: tag.to_string(),
            });
        }

        if let Some(build) = self.builds.latest_for(tag).await? {
            if !build.status.allows_rebuild() {
                return Err(ForgeError::AlreadyBuilt {
                    tag: tag.to_string(),
                });
            }
        }

        let claim = self.claim(tag).ok_or_else(|| ForgeError::AlreadyBuilt {
            tag: tag.to_string(),
        })?;

        let accepted = observe_upstream(
            "dispatch_workflow",
            self.source.dispatch_workflow(&self.branch, tag),
        )
        .await?;

        if accepted {
            claim.commit();
            Ok(DispatchOutcome::Accepted)
        } else {
            Ok(DispatchOutcome::Declined)
        }
    }

    /// Mark `tag` pending unless a dispatch for it is in flight or was
    /// accepted within the grace window.
    fn claim(&self, tag: &str) -> Option<PendingClaim<'_>> {
        let now = Instant::now();
        self.pending
            .retain(|_, pending| !pending.accepted || now.duration_since(pending.since) < self.grace);

        match self.pending.entry(tag.to_string()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(entry) => {
                entry.insert(PendingDispatch {
                    since: now,
                    accepted: false,
                });
            }
        }

        Some(PendingClaim {
            pending: &self.pending,
            tag: tag.to_string(),
            committed: false,
        })
    }

    /// Tags currently blocked by an in-flight or recently accepted dispatch.
    pub fn pending_tags(&self) -> Vec<String> {
        let now = Instant::now();
        let mut tags: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| !entry.accepted || now.duration_since(entry.since) < self.grace)
            .map(|entry| entry.key().clone())
            .collect();
        tags.sort();
        tags
    }
}

impl std::fmt::Debug for BuildDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildDispatcher")
            .field("branch", &self.branch)
            .field("grace", &self.grace)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagforge_core::UpstreamError;
    use tagforge_test_utils::assertions::{
        assert_already_built, assert_invalid_tag, assert_rate_limited, assert_upstream_unavailable,
    };
    use tagforge_test_utils::fixtures::{build_run_name, run_artifact, workflow_run};
    use tagforge_test_utils::{ScriptedBuildSource, ScriptedTagSource};

    const GRACE: Duration = Duration::from_secs(600);

    struct Harness {
        builds: Arc<ScriptedBuildSource>,
        dispatcher: Arc<BuildDispatcher>,
    }

    fn harness(builds: ScriptedBuildSource, limit: u32) -> Harness {
        let tags = Arc::new(ScriptedTagSource::new(["v1.0.0", "v1.1.0", "v1.2.0"]));
        let builds = Arc::new(builds);
        let tag_cache = Arc::new(TagCache::new(tags, Duration::from_secs(3600)));
        let aggregator = Arc::new(BuildStatusAggregator::new(builds.clone(), "X"));
        let quota = Arc::new(DispatchQuota::new(limit, Duration::from_secs(86_400)));
        let dispatcher = Arc::new(BuildDispatcher::new(
            builds.clone(),
            tag_cache,
            aggregator,
            quota,
            "master",
            GRACE,
        ));
        Harness { builds, dispatcher }
    }

    #[tokio::test]
    async fn test_unknown_tag_is_invalid_without_dispatch() {
        let h = harness(ScriptedBuildSource::new(), 10);
        let result = h.dispatcher.dispatch("v9.9.9", "client").await;
        assert_invalid_tag(&result);
        assert_eq!(h.builds.dispatch_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_tag_is_invalid() {
        let h = harness(ScriptedBuildSource::new(), 10);
        assert_invalid_tag(&h.dispatcher.dispatch("   ", "client").await);
        assert_eq!(h.builds.dispatch_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_build_dispatches_exactly_once() -> ForgeResult<()> {
        let h = harness(
            ScriptedBuildSource::new()
                .with_run(workflow_run(1, &build_run_name("X", "1.0.0"), "completed"), vec![]),
            10,
        );

        let outcome = h.dispatcher.dispatch("v1.0.0", "client").await?;
        assert_eq!(outcome, DispatchOutcome::Accepted);
        assert_eq!(
            h.builds.dispatches(),
            vec![("master".to_string(), "v1.0.0".to_string())]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_completed_or_running_build_is_already_built() {
        let h = harness(
            ScriptedBuildSource::new()
                .with_run(
                    workflow_run(1, &build_run_name("X", "1.0.0"), "completed"),
                    vec![run_artifact(10, false)],
                )
                .with_run(workflow_run(2, &build_run_name("X", "1.1.0"), "in_progress"), vec![]),
            10,
        );

        assert_already_built(&h.dispatcher.dispatch("v1.0.0", "client").await);
        assert_already_built(&h.dispatcher.dispatch("v1.1.0", "client").await);
        assert_eq!(h.builds.dispatch_count(), 0);
    }

    #[tokio::test]
    async fn test_quota_checked_before_anything_else() {
        let h = harness(ScriptedBuildSource::new(), 2);
        assert_invalid_tag(&h.dispatcher.dispatch("garbage", "client").await);
        assert_invalid_tag(&h.dispatcher.dispatch("garbage", "client").await);
        assert_rate_limited(&h.dispatcher.dispatch("v1.0.0", "client").await);
        assert_eq!(h.builds.dispatch_count(), 0);
        assert_eq!(h.builds.run_list_calls(), 0);
    }

    #[tokio::test]
    async fn test_accepted_dispatch_blocks_repeat_within_grace() -> ForgeResult<()> {
        let h = harness(ScriptedBuildSource::new(), 10);

        h.dispatcher.dispatch("v1.2.0", "a").await?;
        assert_already_built(&h.dispatcher.dispatch("v1.2.0", "b").await);
        assert_eq!(h.dispatcher.pending_tags(), vec!["v1.2.0".to_string()]);
        assert_eq!(h.builds.dispatch_count(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_window_expires() -> ForgeResult<()> {
        let h = harness(ScriptedBuildSource::new(), 10);

        h.dispatcher.dispatch("v1.2.0", "a").await?;
        tokio::time::advance(GRACE + Duration::from_secs(1)).await;
        assert!(h.dispatcher.pending_tags().is_empty());

        let outcome = h.dispatcher.dispatch("v1.2.0", "a").await?;
        assert!(outcome.is_accepted());
        assert_eq!(h.builds.dispatch_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_declined_dispatch_releases_claim() -> ForgeResult<()> {
        let h = harness(ScriptedBuildSource::new(), 10);
        h.builds.set_dispatch_result(Ok(false));

        assert_eq!(
            h.dispatcher.dispatch("v1.2.0", "a").await?,
            DispatchOutcome::Declined
        );
        assert!(h.dispatcher.pending_tags().is_empty());

        h.builds.set_dispatch_result(Ok(true));
        assert!(h.dispatcher.dispatch("v1.2.0", "a").await?.is_accepted());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_upstream_unavailable() {
        let h = harness(ScriptedBuildSource::new(), 10);
        h.builds.set_dispatch_result(Err(UpstreamError::Timeout {
            operation: "dispatch_workflow".to_string(),
        }));

        assert_upstream_unavailable(&h.dispatcher.dispatch("v1.2.0", "a").await);
        assert!(h.dispatcher.pending_tags().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_dispatch_once() {
        let h = harness(
            ScriptedBuildSource::new().with_dispatch_delay(Duration::from_millis(200)),
            10,
        );

        let first = tokio::spawn({
            let dispatcher = h.dispatcher.clone();
            async move { dispatcher.dispatch("v1.1.0", "a").await }
        });
        let second = tokio::spawn({
            let dispatcher = h.dispatcher.clone();
            async move { dispatcher.dispatch("v1.1.0", "b").await }
        });

        let first = first.await.expect("first task");
        let second = second.await.expect("second task");

        let accepted = [&first, &second]
            .iter()
            .filter(|result| matches!(result, Ok(DispatchOutcome::Accepted)))
            .count();
        assert_eq!(accepted, 1);
        let refused = [&first, &second]
            .iter()
            .filter(|result| matches!(result, Err(ForgeError::AlreadyBuilt { .. })))
            .count();
        assert_eq!(refused, 1);
        assert_eq!(h.builds.dispatch_count(), 1);
    }
}
