//! Freshness contracts for cache reads.
//!
//! This module defines the staleness tolerance that callers must specify
//! when reading from a cache, making cache semantics explicit.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Freshness requirement for cache reads.
///
/// Cached entries are invalidated by events (mutations, identity
/// transitions), so the default accepts whatever is cached. Callers that
/// want a time bound, or a forced reload, say so here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Serve any cached entry that has not been invalidated.
    #[default]
    Cached,

    /// Accept cached data up to the specified age.
    ///
    /// Use this for aggregates that change without a local event, such as
    /// stats computed from other users' ratings.
    BestEffort {
        /// Maximum acceptable staleness for cached data.
        max_staleness: Duration,
    },

    /// Ignore the cache and fetch from the server.
    Reload,
}

impl Freshness {
    /// Create a BestEffort freshness with the given max staleness.
    pub fn best_effort(max_staleness: Duration) -> Self {
        Self::BestEffort { max_staleness }
    }

    /// Freshness for a caller-requested forced reload.
    pub fn forced(force: bool) -> Self {
        if force {
            Self::Reload
        } else {
            Self::Cached
        }
    }

    pub fn is_reload(&self) -> bool {
        matches!(self, Self::Reload)
    }

    /// Whether data cached at `cached_at` satisfies this requirement.
    pub fn accepts(&self, cached_at: DateTime<Utc>) -> bool {
        match self {
            Self::Cached => true,
            Self::BestEffort { max_staleness } => age_of(cached_at) <= *max_staleness,
            Self::Reload => false,
        }
    }
}

fn age_of(cached_at: DateTime<Utc>) -> Duration {
    Utc::now()
        .signed_duration_since(cached_at)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: DateTime<Utc>,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// Create a new cache read from a cache hit.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
        }
    }

    /// Create a new cache read from a server fetch (cache miss).
    pub fn from_server(value: T) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            was_cache_hit: false,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// How long ago the data was fetched from the server.
    pub fn staleness(&self) -> Duration {
        age_of(self.cached_at)
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
