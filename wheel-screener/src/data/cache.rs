//! TTL cache for derived market data.
//!
//! One explicit cache object per concern, constructed once and passed by
//! reference. Expiry is measured against an injected [`Clock`] so tests can
//! move time. Writes are last-writer-wins; the lock is never held across an
//! await point.

use chrono::{DateTime, Duration, Utc};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use crate::clock::SharedClock;

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    data: V,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn new(data: V, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Keyed cache with a default TTL.
pub struct TtlCache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    clock: SharedClock,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value if present and not expired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let cache = self.entries.read().ok()?;

        cache.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.data.clone())
            }
        })
    }

    /// Cache a value with the default TTL.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    /// Cache a value with a custom TTL.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);

        if let Ok(mut cache) = self.entries.write() {
            cache.insert(key, entry);
        }
    }

    pub fn invalidate<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Ok(mut cache) = self.entries.write() {
            cache.remove(key);
        }
    }

    /// Clear all expired entries
    pub fn clear_expired(&self) {
        let now = self.clock.now();
        if let Ok(mut cache) = self.entries.write() {
            cache.retain(|_, entry| !entry.is_expired(now));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.entries.write() {
            cache.clear();
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let (total, expired) = self
            .entries
            .read()
            .map(|c| {
                let total = c.len();
                let expired = c.values().filter(|e| e.is_expired(now)).count();
                (total, expired)
            })
            .unwrap_or((0, 0));

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at_date(
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        ))
    }

    #[test]
    fn test_cache_set_get() {
        let cache: TtlCache<String, f64> = TtlCache::new("iv_range", Duration::days(7), clock());
        cache.insert("AAPL".to_string(), 0.31);

        assert_eq!(cache.get("AAPL"), Some(0.31));
        assert_eq!(cache.get("MSFT"), None);
    }

    #[test]
    fn test_cache_expiry_follows_clock() {
        let clock = clock();
        let cache: TtlCache<String, u32> = TtlCache::new("earnings", Duration::hours(12), clock.clone());
        cache.insert("KO".to_string(), 1);

        clock.advance(Duration::hours(12));
        assert_eq!(cache.get("KO"), Some(1), "boundary instant is still fresh");

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get("KO"), None);

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.active_entries, 0);

        cache.clear_expired();
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn test_cache_custom_ttl_and_invalidate() {
        let clock = clock();
        let cache: TtlCache<String, u32> = TtlCache::new("test", Duration::hours(1), clock.clone());
        cache.insert_with_ttl("A".to_string(), 1, Duration::days(2));
        cache.insert("B".to_string(), 2);

        clock.advance(Duration::hours(2));
        assert_eq!(cache.get("A"), Some(1));
        assert_eq!(cache.get("B"), None);

        cache.invalidate("A");
        assert_eq!(cache.get("A"), None);
    }

    #[test]
    fn test_cache_last_writer_wins() {
        let cache: TtlCache<String, u32> = TtlCache::new("test", Duration::hours(1), clock());
        cache.insert("A".to_string(), 1);
        cache.insert("A".to_string(), 2);
        assert_eq!(cache.get("A"), Some(2));

        cache.clear();
        assert_eq!(cache.stats().total_entries, 0);
    }
}
