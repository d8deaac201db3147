//! The remote review API as seen by the engine.
//!
//! [`ReviewsApi`] is the HTTP collaborator seam: the engine never builds a
//! request itself, it calls through this trait with an explicit
//! [`Identity`]. [`ReviewItem`] routes the generic cache and mutation code to
//! the rating or comment endpoints.

use crate::config::EngineConfig;
use crate::entities::{
    AggregateStats, CachedItem, Comment, CommentDraft, CommentPatch, FavoriteAction,
    FavoriteEntry, FavoriteToggle, Page, Rating, RatingDraft, RatingPatch, ResourceId,
    ResourceKind,
};
use crate::error::{EngineResult, ValidationError};
use crate::identity::Identity;
use crate::validation::Validate;
use async_trait::async_trait;

/// Remote endpoints consumed by the engine.
///
/// Implementations translate transport failures into [`EngineError`]
/// kinds; in particular a 401 on an authenticated call must surface as
/// [`EngineError::SessionExpired`].
///
/// [`EngineError`]: crate::EngineError
/// [`EngineError::SessionExpired`]: crate::EngineError::SessionExpired
#[async_trait]
pub trait ReviewsApi: Send + Sync {
    /// `GET /{kind}/{id}/ratings`
    async fn list_ratings(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<Rating>>;

    /// `GET /{kind}/{id}/comments`
    async fn list_comments(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<Comment>>;

    /// `POST /{kind}/{id}/rate` or `POST /anonymous/ratings/{kind}/{id}`
    async fn create_rating(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: &RatingDraft,
    ) -> EngineResult<Rating>;

    /// `POST /{kind}/{id}/comment` or `POST /anonymous/comments/{kind}/{id}`
    async fn create_comment(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: &CommentDraft,
    ) -> EngineResult<Comment>;

    /// `PUT /{kind}/ratings/{rating_id}` (authenticated only)
    async fn update_rating(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        rating_id: &str,
        patch: &RatingPatch,
    ) -> EngineResult<Rating>;

    /// `DELETE /{kind}/ratings/{rating_id}` (authenticated only)
    async fn delete_rating(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        rating_id: &str,
    ) -> EngineResult<()>;

    /// `PUT /{kind}/comments/{comment_id}` (authenticated only)
    async fn update_comment(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        comment_id: &str,
        patch: &CommentPatch,
    ) -> EngineResult<Comment>;

    /// `DELETE /{kind}/comments/{comment_id}` (authenticated only)
    async fn delete_comment(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        comment_id: &str,
    ) -> EngineResult<()>;

    /// `POST /{kind}/{id}/favorite` or `POST /anonymous/favorites/{kind}/{id}`
    async fn toggle_favorite(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        action: FavoriteAction,
    ) -> EngineResult<FavoriteToggle>;

    /// `GET /favorites` for the authenticated user.
    async fn list_favorites(
        &self,
        identity: &Identity,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<FavoriteEntry>>;

    /// `GET /{kind}/{id}/stats`
    async fn get_stats(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> EngineResult<AggregateStats>;
}

/// Routes a cached item type to its endpoints on [`ReviewsApi`].
#[async_trait]
pub trait ReviewItem: CachedItem {
    async fn fetch_page(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<Self>>;

    async fn create(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: &Self::Draft,
    ) -> EngineResult<Self>;

    async fn update(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        item_id: &str,
        patch: &Self::Patch,
    ) -> EngineResult<Self>;

    async fn delete(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        item_id: &str,
    ) -> EngineResult<()>;

    fn validate_draft(draft: &Self::Draft, config: &EngineConfig) -> Result<(), ValidationError>;

    fn validate_patch(patch: &Self::Patch, config: &EngineConfig) -> Result<(), ValidationError>;
}

#[async_trait]
impl ReviewItem for Rating {
    async fn fetch_page(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<Self>> {
        api.list_ratings(identity, kind, resource_id, page, limit)
            .await
    }

    async fn create(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: &RatingDraft,
    ) -> EngineResult<Self> {
        api.create_rating(identity, kind, resource_id, draft).await
    }

    async fn update(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        item_id: &str,
        patch: &RatingPatch,
    ) -> EngineResult<Self> {
        api.update_rating(identity, kind, item_id, patch).await
    }

    async fn delete(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        item_id: &str,
    ) -> EngineResult<()> {
        api.delete_rating(identity, kind, item_id).await
    }

    fn validate_draft(draft: &RatingDraft, config: &EngineConfig) -> Result<(), ValidationError> {
        draft.validate(config)
    }

    fn validate_patch(patch: &RatingPatch, config: &EngineConfig) -> Result<(), ValidationError> {
        patch.validate(config)
    }
}

#[async_trait]
impl ReviewItem for Comment {
    async fn fetch_page(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<Self>> {
        api.list_comments(identity, kind, resource_id, page, limit)
            .await
    }

    async fn create(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: &CommentDraft,
    ) -> EngineResult<Self> {
        api.create_comment(identity, kind, resource_id, draft).await
    }

    async fn update(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        item_id: &str,
        patch: &CommentPatch,
    ) -> EngineResult<Self> {
        api.update_comment(identity, kind, item_id, patch).await
    }

    async fn delete(
        api: &dyn ReviewsApi,
        identity: &Identity,
        kind: ResourceKind,
        item_id: &str,
    ) -> EngineResult<()> {
        api.delete_comment(identity, kind, item_id).await
    }

    fn validate_draft(draft: &CommentDraft, config: &EngineConfig) -> Result<(), ValidationError> {
        draft.validate(config)
    }

    fn validate_patch(patch: &CommentPatch, config: &EngineConfig) -> Result<(), ValidationError> {
        patch.validate(config)
    }
}
