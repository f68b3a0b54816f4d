//! Fixed-window, per-client dispatch quota.
//!
//! Windows are aligned to the Unix epoch, so a 86400 second window is a UTC
//! calendar day. Every allowed call counts against the client's quota for
//! the window it falls in. Buckets from past windows are replaced lazily
//! when the client returns and swept by [`DispatchQuota::prune_expired`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::telemetry::metrics::with_metrics;

/// Quota exhausted for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaExceeded {
    /// Seconds until the window resets.
    pub retry_after_secs: u64,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: u64,
    count: u32,
}

/// Per-client counters bounded by `limit` calls per window.
#[derive(Debug)]
pub struct DispatchQuota {
    limit: u32,
    window_secs: u64,
    buckets: DashMap<String, Bucket>,
}

impl DispatchQuota {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window_secs: window.as_secs().max(1),
            buckets: DashMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count one call for `client_id` now.
    pub fn allow(&self, client_id: &str) -> Result<(), QuotaExceeded> {
        self.allow_at(client_id, unix_now())
    }

    /// Count one call for `client_id` at `now` (Unix seconds).
    pub fn allow_at(&self, client_id: &str, now: u64) -> Result<(), QuotaExceeded> {
        let window_start = self.window_start(now);
        let mut bucket = self
            .buckets
            .entry(client_id.to_string())
            .or_insert(Bucket {
                window_start,
                count: 0,
            });

        if bucket.window_start != window_start {
            *bucket = Bucket {
                window_start,
                count: 0,
            };
        }

        if bucket.count >= self.limit {
            return Err(QuotaExceeded {
                retry_after_secs: (window_start + self.window_secs).saturating_sub(now).max(1),
            });
        }

        bucket.count += 1;
        Ok(())
    }

    /// Calls left for `client_id` in the window containing `now`.
    pub fn remaining_at(&self, client_id: &str, now: u64) -> u32 {
        let window_start = self.window_start(now);
        match self.buckets.get(client_id) {
            Some(bucket) if bucket.window_start == window_start => {
                self.limit.saturating_sub(bucket.count)
            }
            _ => self.limit,
        }
    }

    /// Drop buckets from past windows. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(unix_now())
    }

    pub fn prune_expired_at(&self, now: u64) -> usize {
        let window_start = self.window_start(now);
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.window_start >= window_start);
        before.saturating_sub(self.buckets.len())
    }

    /// Number of clients with a bucket.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    fn window_start(&self, now: u64) -> u64 {
        now - now % self.window_secs
    }
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Periodically prune stale quota buckets.
pub fn spawn_quota_pruner(quota: Arc<DispatchQuota>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let removed = quota.prune_expired();
            let tracked = quota.tracked_clients();
            with_metrics(|metrics| metrics.set_dispatch_quota_clients(tracked));
            if removed > 0 {
                tracing::debug!(removed, tracked, "Pruned dispatch quota buckets");
            }
        }
    })
}
