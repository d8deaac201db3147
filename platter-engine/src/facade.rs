//! The single entry point for UI code.
//!
//! Every operation reads the auth state once, resolves the [`Identity`] for
//! that call and routes to the anonymous or authenticated path. Callers
//! never branch on the regime themselves.

use platter_cache::{CacheEntry, CacheEvent, CacheRead, Freshness, PageLoad};
use platter_core::{
    AggregateStats, Collection, Comment, CommentDraft, CommentPatch, EngineResult, FavoriteAction,
    FavoriteToggle, Identity, IdentityRegime, Rating, RatingDraft, RatingPatch, ResourceId,
    ResourceKind, ReviewItem, Subscription,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::favorites::{FavoritesLoad, FavoritesView};
use crate::fetch::{ApiCollectionFetcher, ApiStatsFetcher};
use crate::local_ratings::LocalRating;
use crate::mutation::OptimisticMutationCoordinator;

pub struct UnifiedFacade {
    ctx: EngineContext,
}

impl UnifiedFacade {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    // === Identity ===

    pub fn identity(&self) -> EngineResult<Identity> {
        self.ctx.session().identity()
    }

    pub fn regime(&self) -> EngineResult<IdentityRegime> {
        self.ctx.session().regime()
    }

    /// Forget this device: new device id, empty local journal and device
    /// favorites, and no cached data fetched under the old id.
    pub fn reset_device(&self) -> EngineResult<()> {
        self.ctx.session().device().clear()?;
        self.ctx.local_ratings().clear()?;
        self.ctx.favorites().clear_device_list()?;
        for kind in ResourceKind::ALL {
            self.ctx.ratings(kind).cache().invalidate_all()?;
            self.ctx.comments(kind).cache().invalidate_all()?;
        }
        info!("device reset");
        Ok(())
    }

    // === Ratings ===

    pub async fn load_ratings(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: Option<u32>,
        force: bool,
    ) -> EngineResult<CacheRead<CacheEntry<Rating>>> {
        self.load(self.ctx.ratings(kind), resource_id, page, limit, force)
            .await
    }

    pub async fn load_more_ratings(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> EngineResult<PageLoad<Rating>> {
        self.load_more(self.ctx.ratings(kind), resource_id).await
    }

    /// Rate a resource. Anonymous ratings are also recorded in the device
    /// journal.
    pub async fn rate(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: RatingDraft,
    ) -> EngineResult<Rating> {
        let rating = self.ctx.ratings(kind).create(resource_id, draft).await?;
        if rating.anonymous {
            if let Err(err) = self.ctx.local_ratings().record(kind, &rating) {
                warn!(error = %err, "could not record local rating");
            }
        }
        Ok(rating)
    }

    pub async fn update_rating(
        &self,
        kind: ResourceKind,
        rating_id: &str,
        patch: RatingPatch,
    ) -> EngineResult<Rating> {
        self.ctx.ratings(kind).update(rating_id, patch).await
    }

    pub async fn delete_rating(&self, kind: ResourceKind, rating_id: &str) -> EngineResult<()> {
        self.ctx.ratings(kind).delete(rating_id).await
    }

    /// Whether this device rated the resource. No network call.
    pub fn has_rated_locally(&self, kind: ResourceKind, resource_id: &ResourceId) -> EngineResult<bool> {
        self.ctx.local_ratings().has_rated(kind, resource_id)
    }

    pub fn local_rating(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> EngineResult<Option<LocalRating>> {
        self.ctx.local_ratings().local_rating(kind, resource_id)
    }

    // === Comments ===

    pub async fn load_comments(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: Option<u32>,
        force: bool,
    ) -> EngineResult<CacheRead<CacheEntry<Comment>>> {
        self.load(self.ctx.comments(kind), resource_id, page, limit, force)
            .await
    }

    pub async fn load_more_comments(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> EngineResult<PageLoad<Comment>> {
        self.load_more(self.ctx.comments(kind), resource_id).await
    }

    pub async fn comment(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: CommentDraft,
    ) -> EngineResult<Comment> {
        self.ctx.comments(kind).create(resource_id, draft).await
    }

    pub async fn update_comment(
        &self,
        kind: ResourceKind,
        comment_id: &str,
        patch: CommentPatch,
    ) -> EngineResult<Comment> {
        self.ctx.comments(kind).update(comment_id, patch).await
    }

    pub async fn delete_comment(&self, kind: ResourceKind, comment_id: &str) -> EngineResult<()> {
        self.ctx.comments(kind).delete(comment_id).await
    }

    /// Whether a create is in flight for the resource's collection.
    pub fn is_creating(&self, kind: ResourceKind, collection: Collection, resource_id: &ResourceId) -> EngineResult<bool> {
        match collection {
            Collection::Ratings => self.ctx.ratings(kind).is_creating(resource_id),
            Collection::Comments => self.ctx.comments(kind).is_creating(resource_id),
        }
    }

    /// Listen to committed changes of one cached collection.
    pub fn subscribe<L>(&self, kind: ResourceKind, collection: Collection, listener: L) -> Subscription
    where
        L: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        match collection {
            Collection::Ratings => self.ctx.ratings(kind).cache().subscribe(listener),
            Collection::Comments => self.ctx.comments(kind).cache().subscribe(listener),
        }
    }

    // === Stats ===

    /// Aggregate stats, served from cache while younger than the TTL.
    pub async fn stats(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        force: bool,
    ) -> EngineResult<CacheRead<AggregateStats>> {
        let fetcher = ApiStatsFetcher::new(self.ctx.api(), self.ctx.config().read_timeout);
        self.ctx
            .stats()
            .get(kind, resource_id, Freshness::forced(force), &fetcher)
            .await
    }

    // === Favorites ===

    pub async fn toggle_favorite(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> EngineResult<FavoriteToggle> {
        self.ctx
            .favorites()
            .toggle(kind, resource_id, FavoriteAction::Toggle)
            .await
    }

    pub async fn set_favorite(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        favorite: bool,
    ) -> EngineResult<FavoriteToggle> {
        let action = if favorite {
            FavoriteAction::Add
        } else {
            FavoriteAction::Remove
        };
        self.ctx.favorites().toggle(kind, resource_id, action).await
    }

    pub fn is_favorite(&self, kind: ResourceKind, resource_id: &ResourceId) -> EngineResult<bool> {
        self.ctx.favorites().is_favorite(kind, resource_id)
    }

    pub async fn load_favorites(
        &self,
        limit: Option<u32>,
        page: u32,
        force: bool,
    ) -> EngineResult<FavoritesView> {
        let limit = limit.unwrap_or(self.ctx.config().default_page_limit);
        self.ctx.favorites().load_favorites(limit, page, force).await
    }

    pub async fn load_more_favorites(&self) -> EngineResult<FavoritesLoad> {
        self.ctx.favorites().load_more().await
    }

    /// One receiver for the whole session. It follows login and logout.
    pub fn favorites_view(&self) -> watch::Receiver<FavoritesView> {
        self.ctx.favorites().subscribe()
    }

    // === Shared read path ===

    async fn load<T: ReviewItem>(
        &self,
        coordinator: &OptimisticMutationCoordinator<T>,
        resource_id: &ResourceId,
        page: u32,
        limit: Option<u32>,
        force: bool,
    ) -> EngineResult<CacheRead<CacheEntry<T>>> {
        let caller = self.ctx.session().current()?;
        let limit = limit.unwrap_or(self.ctx.config().default_page_limit);
        debug!(kind = %coordinator.kind(), resource_id = %resource_id, page, regime = %caller.identity.regime(), "load");
        let fetcher = ApiCollectionFetcher::new(
            self.ctx.api(),
            self.ctx.session(),
            &caller,
            self.ctx.config().read_timeout,
        );
        coordinator
            .cache()
            .load(resource_id, page, limit, Freshness::forced(force), &fetcher)
            .await
    }

    async fn load_more<T: ReviewItem>(
        &self,
        coordinator: &OptimisticMutationCoordinator<T>,
        resource_id: &ResourceId,
    ) -> EngineResult<PageLoad<T>> {
        let caller = self.ctx.session().current()?;
        let fetcher = ApiCollectionFetcher::new(
            self.ctx.api(),
            self.ctx.session(),
            &caller,
            self.ctx.config().read_timeout,
        );
        coordinator.cache().load_more(resource_id, &fetcher).await
    }
}
