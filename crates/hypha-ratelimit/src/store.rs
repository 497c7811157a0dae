//! Counter stores.
//!
//! The store contract mirrors the three Redis commands the limiter needs:
//! `INCR`, `EXPIRE` and `TTL`. TTL follows Redis conventions: `-2` for a
//! missing key, `-1` for a key with no expiry.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::errors::CounterStoreError;

/// TTL reported for a key that does not exist.
pub const TTL_MISSING: i64 = -2;
/// TTL reported for a key without an expiry.
pub const TTL_PERSISTENT: i64 = -1;

/// Atomic counters with expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` by one, creating it at zero first. Returns the new value.
    async fn increment(&self, key: &str) -> Result<u64, CounterStoreError>;

    /// Expire `key` after `seconds`. No-op if the key does not exist.
    async fn expire(&self, key: &str, seconds: u64) -> Result<(), CounterStoreError>;

    /// Remaining lifetime of `key` in whole seconds.
    async fn ttl(&self, key: &str) -> Result<i64, CounterStoreError>;
}

#[derive(Clone, Copy, Debug, Default)]
struct Counter {
    count: u64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Single-process [`CounterStore`].
///
/// Expiry uses `tokio::time`, so paused-clock tests can step through a
/// window. Expired keys are dropped lazily on access or by
/// [`InMemoryCounterStore::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, Counter>,
}

impl InMemoryCounterStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired(now));
        before.saturating_sub(self.counters.len())
    }

    /// Number of keys held, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, CounterStoreError> {
        let now = Instant::now();
        let mut counter = self.counters.entry(key.to_owned()).or_default();
        if counter.is_expired(now) {
            *counter = Counter::default();
        }
        counter.count += 1;
        Ok(counter.count)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), CounterStoreError> {
        let now = Instant::now();
        if let Some(mut counter) = self.counters.get_mut(key) {
            if !counter.is_expired(now) {
                counter.expires_at = Some(now + Duration::from_secs(seconds));
            }
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64, CounterStoreError> {
        let now = Instant::now();
        let Some(counter) = self.counters.get(key) else {
            return Ok(TTL_MISSING);
        };
        match counter.expires_at {
            None => Ok(TTL_PERSISTENT),
            Some(at) if at <= now => Ok(TTL_MISSING),
            Some(at) => {
                let left = at - now;
                let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
                Ok(i64::try_from(secs).unwrap_or(i64::MAX))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn increment_counts_from_one() {
        let store = InMemoryCounterStore::new();
        assert_eq!(store.increment("k").await.unwrap(), 1);
        assert_eq!(store.increment("k").await.unwrap(), 2);
        assert_eq!(store.increment("other").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_conventions() {
        let store = InMemoryCounterStore::new();
        assert_eq!(store.ttl("k").await.unwrap(), TTL_MISSING);
        let _ = store.increment("k").await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), TTL_PERSISTENT);
        store.expire("k", 60).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), 60);

        tokio::time::advance(Duration::from_millis(20_500)).await;
        assert_eq!(store.ttl("k").await.unwrap(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn counter_resets_after_expiry() {
        let store = InMemoryCounterStore::new();
        let _ = store.increment("k").await.unwrap();
        let _ = store.increment("k").await.unwrap();
        store.expire("k", 60).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(store.ttl("k").await.unwrap(), TTL_MISSING);
        assert_eq!(store.increment("k").await.unwrap(), 1);
        assert_eq!(store.ttl("k").await.unwrap(), TTL_PERSISTENT);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_on_missing_key_is_noop() {
        let store = InMemoryCounterStore::new();
        store.expire("ghost", 10).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_keys() {
        let store = InMemoryCounterStore::new();
        let _ = store.increment("short").await.unwrap();
        store.expire("short", 5).await.unwrap();
        let _ = store.increment("long").await.unwrap();
        store.expire("long", 60).await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.ttl("long").await.unwrap(), 50);
    }
}
