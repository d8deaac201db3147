//! Property tests for paginated cache loads.

use async_trait::async_trait;
use platter_cache::{CollectionFetcher, Freshness, ResourceCache};
use platter_core::{EngineResult, Page, PaginationCursor, Rating, ResourceId, ResourceKind};
use platter_test_utils::rating_fixture;
use proptest::prelude::*;

/// Serves slices of a fixed server-side sequence.
struct SliceFetcher {
    items: Vec<Rating>,
}

#[async_trait]
impl CollectionFetcher<Rating> for SliceFetcher {
    async fn fetch(
        &self,
        _kind: ResourceKind,
        _resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<Rating>> {
        let start = ((page - 1) * limit) as usize;
        let items = self
            .items
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(Page {
            items,
            pagination: PaginationCursor::for_local(self.items.len() as u64, page, limit),
        })
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

fn server_items(count: usize) -> Vec<Rating> {
    let d1 = ResourceId::from("d1");
    (0..count)
        .map(|i| rating_fixture(&format!("r{i}"), &d1, (i % 5) as u8 + 1))
        .collect()
}

proptest! {
    /// Draining with load_more yields the server sequence exactly once.
    #[test]
    fn load_more_reassembles_server_sequence(count in 0usize..40, limit in 1u32..8) {
        let fetcher = SliceFetcher { items: server_items(count) };
        let cache: ResourceCache<Rating> = ResourceCache::new(ResourceKind::Dish, limit);
        let d1 = ResourceId::from("d1");

        let cached = runtime().block_on(async {
            loop {
                let step = cache.load_more(&d1, &fetcher).await.unwrap();
                if step.is_exhausted() {
                    break;
                }
            }
            cache.snapshot(&d1).unwrap().unwrap()
        });

        let expected: Vec<&str> = fetcher.items.iter().map(|r| r.id.as_str()).collect();
        let actual: Vec<&str> = cached.items.iter().map(|r| r.id.as_str()).collect();
        prop_assert_eq!(actual, expected);
        prop_assert!(!cached.cursor.has_next);
    }

    /// Reloading page 1 replaces the sequence instead of appending.
    #[test]
    fn reload_of_first_page_replaces(count in 1usize..30, limit in 1u32..8, loads in 1usize..4) {
        let fetcher = SliceFetcher { items: server_items(count) };
        let cache: ResourceCache<Rating> = ResourceCache::new(ResourceKind::Dish, limit);
        let d1 = ResourceId::from("d1");

        let entry = runtime().block_on(async {
            cache.load_more(&d1, &fetcher).await.unwrap();
            for _ in 0..loads {
                cache.load(&d1, 1, limit, Freshness::Reload, &fetcher).await.unwrap();
            }
            cache.snapshot(&d1).unwrap().unwrap()
        });

        prop_assert_eq!(entry.items.len(), count.min(limit as usize));
        prop_assert_eq!(entry.cursor.page, 1);
    }
}
