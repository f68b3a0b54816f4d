//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use tagforge_core::{BuildSource, TagSource};

use crate::config::ForgeConfig;
use crate::middleware::ClientIpPolicy;
use crate::services::{ArtifactProxy, BuildDispatcher, BuildStatusAggregator, DispatchQuota, TagCache};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub tags: Arc<TagCache>,
    pub builds: Arc<BuildStatusAggregator>,
    pub dispatcher: Arc<BuildDispatcher>,
    pub artifacts: Arc<ArtifactProxy>,
    /// Shared with the background pruner.
    pub quota: Arc<DispatchQuota>,
    pub config: Arc<ForgeConfig>,
    pub client_ip_policy: ClientIpPolicy,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services together over the given upstream sources.
    pub fn new(
        tag_source: Arc<dyn TagSource>,
        build_source: Arc<dyn BuildSource>,
        config: ForgeConfig,
        trust_proxy_headers: bool,
    ) -> Self {
        let tags = Arc::new(TagCache::new(tag_source, config.tag_cache_ttl));
        let builds = Arc::new(BuildStatusAggregator::new(
            build_source.clone(),
            &config.project_name,
        ));
        let quota = Arc::new(DispatchQuota::new(config.dispatch_limit, config.dispatch_window));
        let dispatcher = Arc::new(BuildDispatcher::new(
            build_source.clone(),
            tags.clone(),
            builds.clone(),
            quota.clone(),
            config.branch.clone(),
            config.dispatch_grace,
        ));
        let artifacts = Arc::new(ArtifactProxy::new(build_source, config.artifact_cache_ttl));

        Self {
            tags,
            builds,
            dispatcher,
            artifacts,
            quota,
            config: Arc::new(config),
            client_ip_policy: ClientIpPolicy { trust_proxy_headers },
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<TagCache>, tags);
crate::impl_from_ref!(Arc<BuildStatusAggregator>, builds);
crate::impl_from_ref!(Arc<BuildDispatcher>, dispatcher);
crate::impl_from_ref!(Arc<ArtifactProxy>, artifacts);
crate::impl_from_ref!(Arc<DispatchQuota>, quota);
crate::impl_from_ref!(Arc<ForgeConfig>, config);
crate::impl_from_ref!(ClientIpPolicy, client_ip_policy);
crate::impl_from_ref!(Instant, start_time);
