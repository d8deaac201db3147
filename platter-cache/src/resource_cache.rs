//! Per-resource paginated cache.
//!
//! One [`ResourceCache`] exists per (resource kind, collection) pair, e.g.
//! dish ratings. It owns a single mapping from resource id to
//! [`CacheEntry`]; callers only ever receive cloned snapshots.
//!
//! # Pagination
//!
//! Loading page 1 replaces the cached sequence, loading page `n > 1`
//! appends to it. Appends are not deduplicated: callers must not load a
//! page they already appended.
//!
//! # Generations
//!
//! The cache carries a generation bumped by [`ResourceCache::invalidate_all`]
//! and each bucket carries one assigned at creation. A load records both
//! before awaiting the fetcher and drops its result if either changed, so
//! an invalidation always wins over a fetch that was already in flight.
//! [`ResourceCache::apply_created`] does not touch generations: a page-1
//! load racing with a create may still overwrite the prepended item.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use platter_core::{
    CachedItem, EngineError, EngineResult, Listeners, ResourceId, ResourceKind, StorageError,
    Subscription,
};
use tracing::{debug, warn};

use crate::entry::CacheEntry;
use crate::freshness::{CacheRead, Freshness};
use crate::traits::{CacheStats, CollectionFetcher};

/// Change notification emitted after a committed cache mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Loaded {
        kind: ResourceKind,
        resource_id: ResourceId,
        page: u32,
    },
    Created {
        kind: ResourceKind,
        resource_id: ResourceId,
        item_id: String,
    },
    Updated {
        kind: ResourceKind,
        item_id: String,
        resource_ids: Vec<ResourceId>,
    },
    Deleted {
        kind: ResourceKind,
        item_id: String,
        resource_ids: Vec<ResourceId>,
    },
    Invalidated {
        kind: ResourceKind,
        resource_id: ResourceId,
    },
    InvalidatedAll {
        kind: ResourceKind,
        dropped: usize,
    },
}

/// Outcome of [`ResourceCache::load_more`].
#[derive(Debug, Clone)]
pub enum PageLoad<T> {
    /// The next page was fetched and appended.
    Loaded(CacheRead<CacheEntry<T>>),
    /// The cursor reports no further pages; no request was made.
    NoMorePages,
}

impl<T> PageLoad<T> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::NoMorePages)
    }

    pub fn into_entry(self) -> Option<CacheEntry<T>> {
        match self {
            Self::Loaded(read) => Some(read.into_value()),
            Self::NoMorePages => None,
        }
    }
}

struct Bucket<T> {
    entry: CacheEntry<T>,
    generation: u64,
}

struct CacheState<T> {
    generation: u64,
    next_bucket_generation: u64,
    buckets: HashMap<ResourceId, Bucket<T>>,
    stats: CacheStats,
}

impl<T: CachedItem> CacheState<T> {
    fn bucket_mut(&mut self, resource_id: &ResourceId, limit: u32) -> &mut Bucket<T> {
        let next_generation = &mut self.next_bucket_generation;
        self.buckets
            .entry(resource_id.clone())
            .or_insert_with(|| {
                *next_generation += 1;
                Bucket {
                    entry: CacheEntry::placeholder(limit),
                    generation: *next_generation,
                }
            })
    }

    fn ticket_valid(&self, resource_id: &ResourceId, ticket: LoadTicket) -> bool {
        self.generation == ticket.cache_generation
            && self
                .buckets
                .get(resource_id)
                .is_some_and(|b| b.generation == ticket.bucket_generation)
    }
}

#[derive(Debug, Clone, Copy)]
struct LoadTicket {
    cache_generation: u64,
    bucket_generation: u64,
}

/// Paginated cache for one collection of one resource kind.
pub struct ResourceCache<T: CachedItem> {
    kind: ResourceKind,
    default_limit: u32,
    state: Arc<RwLock<CacheState<T>>>,
    listeners: Arc<Listeners<CacheEvent>>,
}

impl<T: CachedItem> ResourceCache<T> {
    /// Create an empty cache. `default_limit` is the page size used when
    /// `load_more` runs against a resource that was never loaded.
    pub fn new(kind: ResourceKind, default_limit: u32) -> Self {
        Self {
            kind,
            default_limit: default_limit.max(1),
            state: Arc::new(RwLock::new(CacheState {
                generation: 0,
                next_bucket_generation: 0,
                buckets: HashMap::new(),
                stats: CacheStats::default(),
            })),
            listeners: Arc::new(Listeners::new()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Load `page` of the collection for `resource_id`.
    ///
    /// Page 1 is served from cache when an entry exists and `freshness`
    /// accepts it. Otherwise the entry is marked loading and `fetcher` is
    /// called; on success page 1 replaces and later pages append. A failed
    /// fetch leaves the cached items untouched and records the error on
    /// the entry.
    pub async fn load<F>(
        &self,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
        freshness: Freshness,
        fetcher: &F,
    ) -> EngineResult<CacheRead<CacheEntry<T>>>
    where
        F: CollectionFetcher<T> + ?Sized,
    {
        let page = page.max(1);
        let limit = limit.max(1);

        let ticket = {
            let mut state = self.state.write().map_err(|_| StorageError::poisoned("resource cache"))?;
            if page == 1 {
                if let Some(bucket) = state.buckets.get(resource_id) {
                    if let Some(updated) = bucket.entry.last_updated {
                        if freshness.accepts(updated) {
                            let entry = bucket.entry.clone();
                            state.stats.hits += 1;
                            debug!(kind = %self.kind, resource_id = %resource_id, collection = %T::COLLECTION, "cache hit");
                            return Ok(CacheRead::from_cache(entry, updated));
                        }
                    }
                }
            }
            state.stats.misses += 1;
            let cache_generation = state.generation;
            let bucket = state.bucket_mut(resource_id, limit);
            bucket.entry.loading = true;
            LoadTicket {
                cache_generation,
                bucket_generation: bucket.generation,
            }
        };

        debug!(kind = %self.kind, resource_id = %resource_id, collection = %T::COLLECTION, page, limit, "cache miss, fetching");
        let result = fetcher.fetch(self.kind, resource_id, page, limit).await;

        let outcome = {
            let mut state = self.state.write().map_err(|_| StorageError::poisoned("resource cache"))?;
            if !state.ticket_valid(resource_id, ticket) {
                // The entry this load belonged to is gone; errors still
                // reach the caller unchanged.
                if let Err(err) = result {
                    return Err(err);
                }
                state.stats.superseded += 1;
                debug!(kind = %self.kind, resource_id = %resource_id, "load superseded by invalidation");
                return Err(EngineError::Superseded {
                    what: format!("{} {} {}", self.kind, resource_id, T::COLLECTION),
                });
            }
            let bucket = state.bucket_mut(resource_id, limit);
            match result {
                Ok(fetched) => {
                    if page == 1 {
                        bucket.entry.items = fetched.items;
                    } else {
                        bucket.entry.items.extend(fetched.items);
                    }
                    bucket.entry.cursor = fetched.pagination;
                    bucket.entry.loading = false;
                    bucket.entry.last_updated = Some(Utc::now());
                    bucket.entry.error = None;
                    Ok(bucket.entry.clone())
                }
                Err(err) => {
                    bucket.entry.loading = false;
                    bucket.entry.error = Some(err.to_string());
                    Err(err)
                }
            }
        };

        match outcome {
            Ok(entry) => {
                self.listeners.emit(&CacheEvent::Loaded {
                    kind: self.kind,
                    resource_id: resource_id.clone(),
                    page,
                });
                Ok(CacheRead::from_server(entry))
            }
            Err(err) => {
                warn!(kind = %self.kind, resource_id = %resource_id, page, error = %err, "load failed, keeping previous entry");
                Err(err)
            }
        }
    }

    /// Load the page after the current cursor.
    ///
    /// Returns [`PageLoad::NoMorePages`] without a request when the cursor
    /// has no next page. A resource that was never loaded gets page 1.
    pub async fn load_more<F>(&self, resource_id: &ResourceId, fetcher: &F) -> EngineResult<PageLoad<T>>
    where
        F: CollectionFetcher<T> + ?Sized,
    {
        let cursor = {
            let state = self.state.read().map_err(|_| StorageError::poisoned("resource cache"))?;
            state
                .buckets
                .get(resource_id)
                .filter(|b| b.entry.is_loaded())
                .map(|b| b.entry.cursor)
        };

        let (page, limit) = match cursor {
            None => (1, self.default_limit),
            Some(cursor) if !cursor.has_next => {
                debug!(kind = %self.kind, resource_id = %resource_id, "no more pages");
                return Ok(PageLoad::NoMorePages);
            }
            Some(cursor) => (cursor.next_page(), cursor.limit),
        };

        let read = self
            .load(resource_id, page, limit, Freshness::Reload, fetcher)
            .await?;
        Ok(PageLoad::Loaded(read))
    }

    /// Prepend a server-confirmed item to a loaded entry.
    ///
    /// Returns `false` when the resource has no loaded entry; the next load
    /// will fetch the item from the server instead.
    pub fn apply_created(&self, resource_id: &ResourceId, item: T) -> EngineResult<bool> {
        let item_id = item.item_id().to_string();
        {
            let mut state = self.state.write().map_err(|_| StorageError::poisoned("resource cache"))?;
            let Some(bucket) = state.buckets.get_mut(resource_id) else {
                return Ok(false);
            };
            if !bucket.entry.is_loaded() {
                return Ok(false);
            }
            bucket.entry.items.insert(0, item);
            bucket.entry.cursor.total += 1;
        }
        self.listeners.emit(&CacheEvent::Created {
            kind: self.kind,
            resource_id: resource_id.clone(),
            item_id,
        });
        Ok(true)
    }

    /// Patch every cached copy of `item_id`, in whichever bucket it lives.
    /// Returns the resource ids that held the item.
    pub fn apply_updated(&self, item_id: &str, patch: &T::Patch) -> EngineResult<Vec<ResourceId>> {
        let touched = {
            let mut state = self.state.write().map_err(|_| StorageError::poisoned("resource cache"))?;
            let mut touched = Vec::new();
            for (resource_id, bucket) in state.buckets.iter_mut() {
                let mut hit = false;
                for item in bucket.entry.items.iter_mut().filter(|i| i.item_id() == item_id) {
                    item.apply_patch(patch);
                    hit = true;
                }
                if hit {
                    touched.push(resource_id.clone());
                }
            }
            touched
        };
        if !touched.is_empty() {
            self.listeners.emit(&CacheEvent::Updated {
                kind: self.kind,
                item_id: item_id.to_string(),
                resource_ids: touched.clone(),
            });
        }
        Ok(touched)
    }

    /// Remove every cached copy of `item_id`. Returns the resource ids that
    /// held the item.
    pub fn apply_deleted(&self, item_id: &str) -> EngineResult<Vec<ResourceId>> {
        let touched = {
            let mut state = self.state.write().map_err(|_| StorageError::poisoned("resource cache"))?;
            let mut touched = Vec::new();
            for (resource_id, bucket) in state.buckets.iter_mut() {
                let before = bucket.entry.items.len();
                bucket.entry.items.retain(|i| i.item_id() != item_id);
                let removed = (before - bucket.entry.items.len()) as u64;
                if removed > 0 {
                    bucket.entry.cursor.total = bucket.entry.cursor.total.saturating_sub(removed);
                    touched.push(resource_id.clone());
                }
            }
            touched
        };
        if !touched.is_empty() {
            self.listeners.emit(&CacheEvent::Deleted {
                kind: self.kind,
                item_id: item_id.to_string(),
                resource_ids: touched.clone(),
            });
        }
        Ok(touched)
    }

    /// Drop the entry for one resource. The next load fetches.
    pub fn invalidate(&self, resource_id: &ResourceId) -> EngineResult<bool> {
        let removed = {
            let mut state = self.state.write().map_err(|_| StorageError::poisoned("resource cache"))?;
            state.buckets.remove(resource_id).is_some()
        };
        if removed {
            self.listeners.emit(&CacheEvent::Invalidated {
                kind: self.kind,
                resource_id: resource_id.clone(),
            });
        }
        Ok(removed)
    }

    /// Drop every entry and supersede in-flight loads.
    pub fn invalidate_all(&self) -> EngineResult<usize> {
        let dropped = {
            let mut state = self.state.write().map_err(|_| StorageError::poisoned("resource cache"))?;
            state.generation += 1;
            let dropped = state.buckets.len();
            state.buckets.clear();
            dropped
        };
        debug!(kind = %self.kind, collection = %T::COLLECTION, dropped, "cache invalidated");
        self.listeners.emit(&CacheEvent::InvalidatedAll {
            kind: self.kind,
            dropped,
        });
        Ok(dropped)
    }

    /// Immutable copy of the entry for `resource_id`, if any.
    pub fn snapshot(&self, resource_id: &ResourceId) -> EngineResult<Option<CacheEntry<T>>> {
        let state = self.state.read().map_err(|_| StorageError::poisoned("resource cache"))?;
        Ok(state.buckets.get(resource_id).map(|b| b.entry.clone()))
    }

    pub fn is_loading(&self, resource_id: &ResourceId) -> EngineResult<bool> {
        let state = self.state.read().map_err(|_| StorageError::poisoned("resource cache"))?;
        Ok(state
            .buckets
            .get(resource_id)
            .is_some_and(|b| b.entry.loading))
    }

    /// Resource whose cached entry holds `item_id`, if any.
    pub fn resource_of(&self, item_id: &str) -> EngineResult<Option<ResourceId>> {
        let state = self.state.read().map_err(|_| StorageError::poisoned("resource cache"))?;
        Ok(state
            .buckets
            .iter()
            .find(|(_, b)| b.entry.contains(item_id))
            .map(|(id, _)| id.clone()))
    }

    /// Resource ids with a cached entry.
    pub fn resource_ids(&self) -> EngineResult<Vec<ResourceId>> {
        let state = self.state.read().map_err(|_| StorageError::poisoned("resource cache"))?;
        Ok(state.buckets.keys().cloned().collect())
    }

    /// Total number of cached items across all resources.
    pub fn item_count(&self) -> EngineResult<usize> {
        let state = self.state.read().map_err(|_| StorageError::poisoned("resource cache"))?;
        Ok(state.buckets.values().map(|b| b.entry.items.len()).sum())
    }

    pub fn stats(&self) -> EngineResult<CacheStats> {
        let state = self.state.read().map_err(|_| StorageError::poisoned("resource cache"))?;
        let mut stats = state.stats;
        stats.entry_count = state.buckets.len() as u64;
        Ok(stats)
    }

    /// Register a listener for committed changes.
    pub fn subscribe<L>(&self, listener: L) -> Subscription
    where
        L: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }
}

impl<T: CachedItem> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            default_limit: self.default_limit,
            state: Arc::clone(&self.state),
            listeners: Arc::clone(&self.listeners),
        }
    }
}
