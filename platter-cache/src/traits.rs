//! Fetcher seams and cache statistics.
//!
//! The caches never talk to the network directly. On a miss they call a
//! fetcher, which lets the engine decide identity, timeouts and session
//! handling, and lets tests substitute a scripted source.

use async_trait::async_trait;
use platter_core::{AggregateStats, CachedItem, EngineResult, Page, ResourceId, ResourceKind};

/// Source of collection pages for a [`ResourceCache`](crate::ResourceCache).
#[async_trait]
pub trait CollectionFetcher<T: CachedItem>: Send + Sync {
    /// Fetch one page of the collection attached to a resource.
    async fn fetch(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<T>>;
}

/// Source of aggregate stats for a [`StatsCache`](crate::StatsCache).
#[async_trait]
pub trait StatsFetcher: Send + Sync {
    async fn fetch_stats(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> EngineResult<AggregateStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Page-1 loads served from cache.
    pub hits: u64,
    /// Loads that went to the server.
    pub misses: u64,
    /// Fetch results discarded because the cache was invalidated meanwhile.
    pub superseded: u64,
    /// Resource buckets currently cached.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
