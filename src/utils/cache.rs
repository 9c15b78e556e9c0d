use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, VariantNames};
use tokio::time::Instant;
use tracing::info;

/// Cache entry with an absolute expiry
#[derive(Clone, Debug)]
pub struct CacheItem<T> {
    pub data: T,
    pub expires_at: Instant,
}

impl<T> CacheItem<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct CacheCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

/// Point-in-time view of a cache's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub key_count: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Key/value cache with a per-instance default TTL.
///
/// Expired entries are dropped lazily on read and by [`TtlCache::cleanup_expired`];
/// a value is never handed out once its expiry has passed.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheItem<V>>,
    counters: CacheCounters,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            counters: CacheCounters::default(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(item) = self.entries.get(key) {
            if !item.is_expired() {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(item.data.clone());
            }
        }
        // The read guard must be gone before removing
        if self.entries.remove_if(key, |_, item| item.is_expired()).is_some() {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `value` under `key`, using the instance TTL unless `ttl` is given.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let item = CacheItem::new(value, ttl.unwrap_or(self.default_ttl));
        self.entries.insert(key.into(), item);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn flush(&self) {
        self.entries.clear();
    }

    /// Drop every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, item| now < item.expires_at);
        let removed = before.saturating_sub(self.entries.len());
        self.counters.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.cleanup_expired();
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            key_count: self.entries.len(),
        }
    }
}

/// Volatility tier of cached upstream data
#[derive(Copy, Clone, Debug, Display, PartialEq, Hash, Eq, EnumString, VariantNames, EnumIter, Deserialize, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Minutes: notices
    Short,
    /// About an hour: rates and special tariffs
    Default,
    /// A day: rulings and chapter listings
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieredCacheStats {
    pub short: CacheStats,
    pub default: CacheStats,
    pub long: CacheStats,
}

/// The three cache instances shared by all source clients
#[derive(Debug)]
pub struct TieredCache<V> {
    short: TtlCache<V>,
    default: TtlCache<V>,
    long: TtlCache<V>,
}

impl<V: Clone> TieredCache<V> {
    pub fn new(short_ttl: Duration, default_ttl: Duration, long_ttl: Duration) -> Self {
        Self {
            short: TtlCache::new(short_ttl),
            default: TtlCache::new(default_ttl),
            long: TtlCache::new(long_ttl),
        }
    }

    pub fn tier(&self, tier: CacheTier) -> &TtlCache<V> {
        match tier {
            CacheTier::Short => &self.short,
            CacheTier::Default => &self.default,
            CacheTier::Long => &self.long,
        }
    }

    /// Flush one tier, or all of them when `tier` is `None`
    pub fn clear(&self, tier: Option<CacheTier>) {
        match tier {
            Some(tier) => {
                self.tier(tier).flush();
                info!("Flushed {} cache tier", tier);
            }
            None => {
                for tier in CacheTier::iter() {
                    self.tier(tier).flush();
                }
                info!("Flushed all cache tiers");
            }
        }
    }

    pub fn cleanup_expired(&self) -> usize {
        CacheTier::iter().map(|tier| self.tier(tier).cleanup_expired()).sum()
    }

    pub fn stats(&self) -> TieredCacheStats {
        TieredCacheStats {
            short: self.short.stats(),
            default: self.default.stats(),
            long: self.long.stats(),
        }
    }
}
