//! Client-side caches with explicit freshness contracts.
//!
//! # Design Philosophy
//!
//! The server is the only authoritative store. Everything cached here can
//! be dropped at any time and rebuilt lazily. Callers state their
//! staleness tolerance via [`Freshness`] and every read returns a
//! [`CacheRead<T>`] saying whether it was served from cache.
//!
//! # Layout
//!
//! - [`ResourceCache<T>`] holds one paginated [`CacheEntry<T>`] per resource
//!   id, for one collection (ratings or comments) of one resource kind.
//! - [`StatsCache`] holds TTL-bounded [`AggregateStats`] per resource.
//!
//! # Example
//!
//! ```ignore
//! let cache: ResourceCache<Rating> = ResourceCache::new(ResourceKind::Dish, 10);
//! let read = cache.load(&dish_id, 1, 10, Freshness::Cached, &fetcher).await?;
//! if read.was_cache_hit() {
//!     tracing::debug!("served from cache");
//! }
//! ```
//!
//! [`AggregateStats`]: platter_core::AggregateStats

pub mod entry;
pub mod freshness;
pub mod resource_cache;
pub mod stats;
pub mod traits;

pub use entry::CacheEntry;
pub use freshness::{CacheRead, Freshness};
pub use resource_cache::{CacheEvent, PageLoad, ResourceCache};
pub use stats::StatsCache;
pub use traits::{CacheStats, CollectionFetcher, StatsFetcher};
