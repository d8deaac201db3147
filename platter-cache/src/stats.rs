//! Aggregate stats cache.
//!
//! Stats are computed server-side from everyone's ratings, so unlike the
//! collection caches they age out on a TTL as well as being dropped when a
//! local mutation touches the resource.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use platter_core::{
    AggregateStats, EngineError, EngineResult, ResourceId, ResourceKind, StorageError, Timestamp,
};
use tracing::debug;

use crate::freshness::{CacheRead, Freshness};
use crate::traits::StatsFetcher;

struct StatsState {
    generation: u64,
    entries: HashMap<(ResourceKind, ResourceId), (AggregateStats, Timestamp)>,
}

/// TTL cache of [`AggregateStats`] keyed by resource.
#[derive(Clone)]
pub struct StatsCache {
    ttl: Duration,
    state: Arc<RwLock<StatsState>>,
}

impl StatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Arc::new(RwLock::new(StatsState {
                generation: 0,
                entries: HashMap::new(),
            })),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get stats for a resource. [`Freshness::Cached`] is bounded by the TTL.
    pub async fn get<F>(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        freshness: Freshness,
        fetcher: &F,
    ) -> EngineResult<CacheRead<AggregateStats>>
    where
        F: StatsFetcher + ?Sized,
    {
        let freshness = match freshness {
            Freshness::Cached => Freshness::best_effort(self.ttl),
            other => other,
        };
        let key = (kind, resource_id.clone());

        let generation = {
            let state = self.state.read().map_err(|_| StorageError::poisoned("stats cache"))?;
            if let Some((stats, cached_at)) = state.entries.get(&key) {
                if freshness.accepts(*cached_at) {
                    return Ok(CacheRead::from_cache(stats.clone(), *cached_at));
                }
            }
            state.generation
        };

        debug!(kind = %kind, resource_id = %resource_id, "fetching stats");
        let stats = fetcher.fetch_stats(kind, resource_id).await?.normalized();

        let mut state = self.state.write().map_err(|_| StorageError::poisoned("stats cache"))?;
        if state.generation != generation {
            return Err(EngineError::Superseded {
                what: format!("{} {} stats", kind, resource_id),
            });
        }
        state.entries.insert(key, (stats.clone(), Utc::now()));
        Ok(CacheRead::from_server(stats))
    }

    /// Cached stats, ignoring age.
    pub fn peek(&self, kind: ResourceKind, resource_id: &ResourceId) -> EngineResult<Option<AggregateStats>> {
        let state = self.state.read().map_err(|_| StorageError::poisoned("stats cache"))?;
        Ok(state
            .entries
            .get(&(kind, resource_id.clone()))
            .map(|(stats, _)| stats.clone()))
    }

    /// Drop the stats of one resource and supersede in-flight fetches.
    pub fn invalidate(&self, kind: ResourceKind, resource_id: &ResourceId) -> EngineResult<bool> {
        let mut state = self.state.write().map_err(|_| StorageError::poisoned("stats cache"))?;
        state.generation += 1;
        Ok(state.entries.remove(&(kind, resource_id.clone())).is_some())
    }

    pub fn invalidate_all(&self) -> EngineResult<usize> {
        let mut state = self.state.write().map_err(|_| StorageError::poisoned("stats cache"))?;
        state.generation += 1;
        let dropped = state.entries.len();
        state.entries.clear();
        Ok(dropped)
    }
}
