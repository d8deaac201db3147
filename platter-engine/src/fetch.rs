//! Adapters from the remote API to the cache fetcher seams, with timeouts.

use async_trait::async_trait;
use platter_cache::{CollectionFetcher, StatsFetcher};
use platter_core::{
    AggregateStats, EngineError, EngineResult, Page, ResourceId, ResourceKind, ReviewItem,
    ReviewsApi,
};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::session::{Session, SessionIdentity};

/// Bound `future` by `after`. Expiry is an ordinary [`EngineError::Timeout`];
/// nothing is retried.
pub async fn timed<T, F>(operation: &str, after: Duration, future: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(after, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = after.as_millis() as u64, "request timed out");
            Err(EngineError::Timeout {
                operation: operation.to_string(),
                after,
            })
        }
    }
}

/// Collection fetcher bound to one identity for the duration of a load.
pub struct ApiCollectionFetcher<'a> {
    api: &'a dyn ReviewsApi,
    session: &'a Session,
    caller: &'a SessionIdentity,
    timeout: Duration,
}

impl<'a> ApiCollectionFetcher<'a> {
    pub fn new(
        api: &'a dyn ReviewsApi,
        session: &'a Session,
        caller: &'a SessionIdentity,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            session,
            caller,
            timeout,
        }
    }
}

#[async_trait]
impl<'a, T: ReviewItem> CollectionFetcher<T> for ApiCollectionFetcher<'a> {
    async fn fetch(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<T>> {
        let operation = format!("load {} {}", kind, T::COLLECTION);
        let result = timed(
            &operation,
            self.timeout,
            T::fetch_page(self.api, &self.caller.identity, kind, resource_id, page, limit),
        )
        .await;
        self.session.observe(self.caller, result)
    }
}

/// Stats fetcher over the public stats endpoint.
pub struct ApiStatsFetcher<'a> {
    api: &'a dyn ReviewsApi,
    timeout: Duration,
}

impl<'a> ApiStatsFetcher<'a> {
    pub fn new(api: &'a dyn ReviewsApi, timeout: Duration) -> Self {
        Self { api, timeout }
    }
}

#[async_trait]
impl<'a> StatsFetcher for ApiStatsFetcher<'a> {
    async fn fetch_stats(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> EngineResult<AggregateStats> {
        timed("load stats", self.timeout, self.api.get_stats(kind, resource_id)).await
    }
}
