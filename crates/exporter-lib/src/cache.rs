//! Time-bounded enrichment cache
//!
//! Refiners use this to avoid repeating expensive monitoring lookups
//! within a time window. Entries are either static values or
//! "dynamic": a registered generator is re-invoked transparently when
//! the value is missing or expired. Expired static values are evicted
//! lazily on access and reaped by a lifecycle-scoped background sweep
//! so never-touched entries do not accumulate.
//!
//! The cache guarantees correctness of the stored value under
//! concurrent access, not cross-call mutual exclusion; refiners hold
//! their own mutex around the check-else-populate sequence so an API
//! call happens at most once per miss.

use anyhow::Result;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Zero-argument async value generator for dynamic entries.
pub type Generator<V> =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<V>> + Send>> + Send + Sync>;

struct Entry<V> {
    value: Option<(V, Instant)>,
    /// Present only for dynamic entries: regenerator plus the TTL
    /// applied to regenerated values.
    generator: Option<(Generator<V>, Duration)>,
}

impl<V> Entry<V> {
    fn live_value(&self, now: Instant) -> Option<&V> {
        match &self.value {
            Some((value, expires_at)) if now < *expires_at => Some(value),
            _ => None,
        }
    }
}

/// Concurrent key/value store with per-entry expiry
pub struct ExpiringCache<V> {
    entries: Arc<DashMap<String, Entry<V>>>,
    _sweeper: Arc<Sweeper>,
}

impl<V> Clone for ExpiringCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            _sweeper: Arc::clone(&self._sweeper),
        }
    }
}

/// Aborts the sweep task when the last cache handle is dropped.
struct Sweeper {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl<V: Clone + Send + Sync + 'static> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> ExpiringCache<V> {
    /// Create a cache with the standard 1s sweep granularity.
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self::with_sweep_interval(Duration::from_secs(1))
    }

    /// Create a cache with a custom sweep interval.
    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        let entries: Arc<DashMap<String, Entry<V>>> = Arc::new(DashMap::new());

        // The sweep task holds a weak reference so it never keeps the
        // map alive past the last cache handle.
        let weak = Arc::downgrade(&entries);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(map) = weak.upgrade() else { break };
                let now = Instant::now();
                map.retain(|_, entry| {
                    if entry.live_value(now).is_none() {
                        entry.value = None;
                    }
                    entry.value.is_some() || entry.generator.is_some()
                });
            }
        });

        Self {
            entries,
            _sweeper: Arc::new(Sweeper { handle }),
        }
    }

    /// Store a value with an absolute expiry, overwriting any existing
    /// entry (including a dynamic one).
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Entry {
                value: Some((value, Instant::now() + ttl)),
                generator: None,
            },
        );
    }

    /// Fetch a value if present and not expired.
    ///
    /// For a dynamic key with a missing or expired value the
    /// registered generator is re-invoked; its error propagates and
    /// nothing is cached, so the next call retries.
    pub async fn get(&self, key: &str) -> Result<Option<V>> {
        let now = Instant::now();
        let regenerate = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) => {
                if let Some(value) = entry.live_value(now) {
                    return Ok(Some(value.clone()));
                }
                entry.generator.clone()
            }
        };

        match regenerate {
            Some((generator, ttl)) => {
                debug!(key = %key, "regenerating dynamic cache entry");
                let value = generator().await?;
                if let Some(mut entry) = self.entries.get_mut(key) {
                    entry.value = Some((value.clone(), Instant::now() + ttl));
                }
                Ok(Some(value))
            }
            None => {
                // Expired static entry: evict lazily.
                self.entries
                    .remove_if(key, |_, entry| entry.live_value(Instant::now()).is_none());
                Ok(None)
            }
        }
    }

    /// Return the cached value for `key`, or invoke `generator`, store
    /// its result and return it. A generator error propagates and
    /// leaves nothing cached.
    pub async fn get_or_set<F, Fut>(&self, key: &str, generator: F, ttl: Duration) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(entry) = self.entries.get(key) {
            if let Some(value) = entry.live_value(Instant::now()) {
                return Ok(value.clone());
            }
        }

        let value = generator().await?;
        self.set(key.to_string(), value.clone(), ttl);
        Ok(value)
    }

    /// Whether `key` holds an unexpired value right now. Never invokes
    /// a dynamic entry's generator, unlike `get`.
    pub fn has_live(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| entry.live_value(now).is_some())
    }

    /// Register `key` as dynamic if absent. Subsequent `get` calls
    /// invoke the generator whenever the value is missing or expired.
    pub fn set_dynamic_if_not_exists<F, Fut>(&self, key: impl Into<String>, generator: F, ttl: Duration)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let boxed: Generator<V> = Arc::new(move || Box::pin(generator()));
        self.entries.entry(key.into()).or_insert(Entry {
            value: None,
            generator: Some((boxed, ttl)),
        });
    }

    /// Number of entries currently held, including dynamic placeholders.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_set_then_get() {
        let cache: ExpiringCache<u64> = ExpiringCache::new();
        cache.set("answer", 42, Duration::from_secs(60));
        assert_eq!(cache.get("answer").await.unwrap(), Some(42));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let cache: ExpiringCache<u64> = ExpiringCache::new();
        cache.set("flash", 1, Duration::ZERO);
        assert_eq!(cache.get("flash").await.unwrap(), None);
        // Lazy eviction removed the entry.
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let cache: ExpiringCache<u64> = ExpiringCache::new();
        cache.set("k", 1, Duration::from_secs(60));
        cache.set("k", 2, Duration::from_secs(60));
        assert_eq!(cache.get("k").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_get_or_set_invokes_generator_once_per_window() {
        let cache: ExpiringCache<u64> = ExpiringCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..5 {
            let value = cache
                .get_or_set(
                    "expensive",
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(7)
                    },
                    Duration::from_secs(60),
                )
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_set_error_caches_nothing() {
        let cache: ExpiringCache<u64> = ExpiringCache::new();

        let result = cache
            .get_or_set(
                "broken",
                || async { Err(anyhow::anyhow!("backend down")) },
                Duration::from_secs(60),
            )
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());

        // The next call retries and can succeed.
        let value = cache
            .get_or_set("broken", || async { Ok(9) }, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(value, 9);
    }

    #[tokio::test]
    async fn test_dynamic_key_regenerates_on_expiry() {
        let cache: ExpiringCache<u64> = ExpiringCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        cache.set_dynamic_if_not_exists(
            "regional_average",
            move || {
                let counter = Arc::clone(&counter);
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst) as u64) }
            },
            Duration::ZERO,
        );

        // Zero TTL: every get re-invokes the generator.
        assert_eq!(cache.get("regional_average").await.unwrap(), Some(0));
        assert_eq!(cache.get("regional_average").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_dynamic_key_caches_within_ttl() {
        let cache: ExpiringCache<u64> = ExpiringCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        cache.set_dynamic_if_not_exists(
            "regional_average",
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(5)
                }
            },
            Duration::from_secs(60),
        );

        for _ in 0..3 {
            assert_eq!(cache.get("regional_average").await.unwrap(), Some(5));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dynamic_generator_error_propagates_until_success() {
        let cache: ExpiringCache<u64> = ExpiringCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        cache.set_dynamic_if_not_exists(
            "flaky",
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(anyhow::anyhow!("monitoring unavailable"))
                    } else {
                        Ok(11)
                    }
                }
            },
            Duration::from_secs(60),
        );

        assert!(cache.get("flaky").await.is_err());
        assert!(cache.get("flaky").await.is_err());
        assert_eq!(cache.get("flaky").await.unwrap(), Some(11));
        // Value cached now, generator not re-invoked.
        assert_eq!(cache.get("flaky").await.unwrap(), Some(11));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_has_live_never_invokes_generator() {
        let cache: ExpiringCache<u64> = ExpiringCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        cache.set_dynamic_if_not_exists(
            "k",
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(3)
                }
            },
            Duration::ZERO,
        );

        // A registered-but-unpopulated dynamic key is not live, and
        // checking it must not run the generator.
        assert!(!cache.has_live("k"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(cache.get("k").await.unwrap(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Zero TTL: the stored value is already expired again.
        assert!(!cache.has_live("k"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_dynamic_if_not_exists_keeps_first_registration() {
        let cache: ExpiringCache<u64> = ExpiringCache::new();
        cache.set_dynamic_if_not_exists("k", || async { Ok(1) }, Duration::from_secs(60));
        cache.set_dynamic_if_not_exists("k", || async { Ok(2) }, Duration::from_secs(60));
        assert_eq!(cache.get("k").await.unwrap(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_reaps_expired_static_entries() {
        let cache: ExpiringCache<u64> = ExpiringCache::with_sweep_interval(Duration::from_secs(1));
        cache.set("short", 1, Duration::from_millis(10));
        cache.set_dynamic_if_not_exists("dynamic", || async { Ok(2) }, Duration::from_secs(60));
        assert_eq!(cache.len(), 2);

        // Let the sweep tick past the expiry without any lookups.
        tokio::time::sleep(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;

        // The static entry is gone, the dynamic placeholder survives.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("dynamic").await.unwrap(), Some(2));
    }
}
