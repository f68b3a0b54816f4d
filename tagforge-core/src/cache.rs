//! Single-slot, single-flight TTL cache.
//!
//! The slot is guarded by an async mutex that stays held while a refresh
//! runs. Callers arriving during a refresh wait for it and then read its
//! result, so at most one refresh is in flight at any time.
//!
//! When a refresh fails the previous value, however old, is served instead
//! and its timestamp is left untouched so the next caller retries.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{ForgeError, ForgeResult};

/// A cached value with the instant it was computed.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    value: T,
    computed_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, computed_at: Instant) -> Self {
        Self { value, computed_at }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn computed_at(&self) -> Instant {
        self.computed_at
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.computed_at)
    }

    /// An entry is fresh until `now > computed_at + ttl`.
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        self.age(now) <= ttl
    }
}

/// How a cache read was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from a fresh entry.
    Hit,
    /// Recomputed by this call.
    Refreshed,
    /// Refresh failed; an expired entry was served instead.
    Stale { error: ForgeError },
}

/// A value read from a [`TtlCache`] together with how it was obtained.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    outcome: CacheOutcome,
    age: Duration,
}

impl<T> CacheRead<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn outcome(&self) -> &CacheOutcome {
        &self.outcome
    }

    /// Age of the served value.
    pub fn age(&self) -> Duration {
        self.age
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.outcome, CacheOutcome::Stale { .. })
    }
}

/// Time-bounded cache holding exactly one value.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Option<CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value, running `refresh` first when the slot is
    /// empty or expired.
    ///
    /// `refresh` is only invoked while the slot lock is held.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> ForgeResult<CacheRead<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ForgeResult<T>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.as_ref() {
            let now = Instant::now();
            if entry.is_fresh(self.ttl, now) {
                return Ok(CacheRead {
                    value: entry.value.clone(),
                    outcome: CacheOutcome::Hit,
                    age: entry.age(now),
                });
            }
        }

        match refresh().await {
            Ok(value) => {
                *slot = Some(CacheEntry::new(value.clone(), Instant::now()));
                Ok(CacheRead {
                    value,
                    outcome: CacheOutcome::Refreshed,
                    age: Duration::ZERO,
                })
            }
            Err(error) => match slot.as_ref() {
                Some(entry) => Ok(CacheRead {
                    value: entry.value.clone(),
                    outcome: CacheOutcome::Stale { error },
                    age: entry.age(Instant::now()),
                }),
                None => Err(error),
            },
        }
    }

    /// Drop the cached value; the next read refreshes.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Current value regardless of freshness, without refreshing.
    pub async fn peek(&self) -> Option<T> {
        self.slot.lock().await.as_ref().map(|entry| entry.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(3600);

    fn upstream_down() -> ForgeError {
        ForgeError::UpstreamUnavailable(UpstreamError::Timeout {
            operation: "list_tags".to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_read_within_ttl_is_a_hit() -> ForgeResult<()> {
        let cache = TtlCache::new(TTL);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let first = cache
            .get_or_refresh(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["v1.0.0".to_string()])
            })
            .await?;
        assert_eq!(first.outcome(), &CacheOutcome::Refreshed);

        tokio::time::advance(Duration::from_secs(60)).await;

        let second = cache
            .get_or_refresh(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["v2.0.0".to_string()])
            })
            .await?;
        assert_eq!(second.outcome(), &CacheOutcome::Hit);
        assert_eq!(second.value(), &vec!["v1.0.0".to_string()]);
        assert_eq!(second.age(), Duration::from_secs(60));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_is_fresh_at_exact_ttl() -> ForgeResult<()> {
        let cache = TtlCache::new(TTL);
        cache.get_or_refresh(|| async { Ok(1u32) }).await?;

        tokio::time::advance(TTL).await;
        let read = cache.get_or_refresh(|| async { Ok(2u32) }).await?;
        assert_eq!(*read.value(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        let read = cache.get_or_refresh(|| async { Ok(3u32) }).await?;
        assert_eq!(*read.value(), 3);
        assert_eq!(read.outcome(), &CacheOutcome::Refreshed);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_serves_stale_value() -> ForgeResult<()> {
        let cache = TtlCache::new(TTL);
        cache.get_or_refresh(|| async { Ok("old".to_string()) }).await?;

        tokio::time::advance(TTL * 2).await;
        let read = cache
            .get_or_refresh(|| async { Err(upstream_down()) })
            .await?;
        assert!(read.is_stale());
        assert_eq!(read.value(), "old");
        assert_eq!(read.age(), TTL * 2);

        // The stale entry keeps its timestamp, so the next read retries.
        let read = cache
            .get_or_refresh(|| async { Ok("new".to_string()) })
            .await?;
        assert_eq!(read.outcome(), &CacheOutcome::Refreshed);
        assert_eq!(read.value(), "new");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_refresh_without_value_propagates() {
        let cache: TtlCache<Vec<String>> = TtlCache::new(TTL);
        let result = cache.get_or_refresh(|| async { Err(upstream_down()) }).await;
        assert!(matches!(result, Err(ForgeError::UpstreamUnavailable(_))));
        assert!(cache.peek().await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() -> ForgeResult<()> {
        let cache = TtlCache::new(TTL);
        cache.get_or_refresh(|| async { Ok(1u8) }).await?;
        cache.invalidate().await;
        assert!(cache.peek().await.is_none());

        let read = cache.get_or_refresh(|| async { Ok(2u8) }).await?;
        assert_eq!(read.outcome(), &CacheOutcome::Refreshed);
        assert_eq!(*read.value(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_readers_share_one_refresh() -> ForgeResult<()> {
        let cache = Arc::new(TtlCache::new(TTL));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        Ok(7u64)
                    })
                    .await
                    .map(CacheRead::into_value)
            }));
        }

        for handle in handles {
            let value = handle.await.expect("reader task panicked")?;
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
