//! Cached collection entry for one resource.

use platter_core::{CachedItem, PaginationCursor, Timestamp};

/// Paginated items cached for one resource id.
///
/// `items` is most-recent-first. `last_updated` is `None` until a load has
/// succeeded, so a placeholder created while the first load is in flight
/// is never served as a cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub items: Vec<T>,
    pub cursor: PaginationCursor,
    pub loading: bool,
    pub last_updated: Option<Timestamp>,
    /// Message of the most recent failed load, cleared on success.
    pub error: Option<String>,
}

impl<T: CachedItem> CacheEntry<T> {
    pub(crate) fn placeholder(limit: u32) -> Self {
        Self {
            items: Vec::new(),
            cursor: PaginationCursor::empty(limit),
            loading: false,
            last_updated: None,
            error: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.last_updated.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.items.iter().any(|item| item.item_id() == item_id)
    }

    pub fn get(&self, item_id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.item_id() == item_id)
    }
}
