//! Entity types: ratings, comments, favorites, aggregate stats and the
//! pagination cursor shared with the remote API.

use crate::identity::{DeviceId, Identity, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// RESOURCE ADDRESSING
// ============================================================================

/// Kind of resource that can be rated, commented on and favorited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Dish,
    Restaurant,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Dish, ResourceKind::Restaurant];

    /// Path segment used by the remote API (`/{kind}/{id}/...`).
    pub fn as_path(&self) -> &'static str {
        match self {
            ResourceKind::Dish => "dish",
            ResourceKind::Restaurant => "restaurant",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

/// Identifier of a dish or restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Paginated collection attached to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Ratings,
    Comments,
}

impl Collection {
    pub fn as_path(&self) -> &'static str {
        match self {
            Collection::Ratings => "ratings",
            Collection::Comments => "comments",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

// ============================================================================
// PAGINATION
// ============================================================================

/// Pagination metadata, a field-for-field mapping of the API's
/// `pagination` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationCursor {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationCursor {
    /// Cursor for a collection with nothing loaded yet.
    pub fn empty(limit: u32) -> Self {
        Self {
            page: 0,
            limit,
            total: 0,
            total_pages: 0,
            has_next: false,
            has_prev: false,
        }
    }

    /// Compute the cursor for `page` of a locally held sequence of `total`
    /// items.
    pub fn for_local(total: u64, page: u32, limit: u32) -> Self {
        let limit = limit.max(1);
        let total_pages = total.div_ceil(u64::from(limit)) as u32;
        let page = page.max(1);
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    pub fn next_page(&self) -> u32 {
        self.page + 1
    }
}

/// One page of a remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PaginationCursor,
}

// ============================================================================
// RATINGS AND COMMENTS
// ============================================================================

/// A star rating left on a resource.
///
/// Exactly one of `user_id` / `device_id` is set, matching `anonymous`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: String,
    #[serde(alias = "dishId", alias = "restaurantId")]
    pub resource_id: ResourceId,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

/// A written comment on a resource, optionally carrying a rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(alias = "dishId", alias = "restaurantId")]
    pub resource_id: ResourceId,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

/// Input for creating a rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingDraft {
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RatingDraft {
    pub fn new(rating: u8) -> Self {
        Self {
            rating,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Input for creating a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
}

impl CommentDraft {
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            rating: None,
        }
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// Partial update of a rating; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Partial update of a comment; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
}

/// An item held in a per-resource paginated cache.
pub trait CachedItem: Clone + fmt::Debug + Send + Sync + 'static {
    /// Creation input.
    type Draft: Clone + fmt::Debug + Send + Sync + 'static;
    /// Partial update input.
    type Patch: Clone + fmt::Debug + Send + Sync + 'static;

    /// Which collection of a resource this item lives in.
    const COLLECTION: Collection;

    fn item_id(&self) -> &str;

    fn resource_id(&self) -> &ResourceId;

    /// Apply a patch in place.
    fn apply_patch(&mut self, patch: &Self::Patch);

    /// A patch carrying every mutable field of `self`.
    fn to_patch(&self) -> Self::Patch;

    /// Build a client-side provisional item for `draft`, owned by `identity`.
    fn provisional(
        resource_id: ResourceId,
        draft: &Self::Draft,
        identity: &Identity,
        now: Timestamp,
    ) -> Self;

    /// Whether the ownership fields agree with the `anonymous` flag.
    fn owner_is_consistent(&self) -> bool;
}

fn provisional_id() -> String {
    format!("provisional-{}", uuid::Uuid::now_v7().simple())
}

impl CachedItem for Rating {
    type Draft = RatingDraft;
    type Patch = RatingPatch;

    const COLLECTION: Collection = Collection::Ratings;

    fn item_id(&self) -> &str {
        &self.id
    }

    fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    fn apply_patch(&mut self, patch: &RatingPatch) {
        if let Some(rating) = patch.rating {
            self.rating = rating;
        }
        if let Some(comment) = &patch.comment {
            self.comment = Some(comment.clone());
        }
    }

    fn to_patch(&self) -> RatingPatch {
        RatingPatch {
            rating: Some(self.rating),
            comment: self.comment.clone(),
        }
    }

    fn provisional(
        resource_id: ResourceId,
        draft: &RatingDraft,
        identity: &Identity,
        now: Timestamp,
    ) -> Self {
        Self {
            id: provisional_id(),
            resource_id,
            rating: draft.rating,
            comment: draft.comment.clone(),
            timestamp: now,
            anonymous: !identity.is_authenticated(),
            user_id: identity.user_id().cloned(),
            device_id: identity.device_id().cloned(),
        }
    }

    fn owner_is_consistent(&self) -> bool {
        owner_consistent(self.anonymous, &self.user_id, &self.device_id)
    }
}

impl CachedItem for Comment {
    type Draft = CommentDraft;
    type Patch = CommentPatch;

    const COLLECTION: Collection = Collection::Comments;

    fn item_id(&self) -> &str {
        &self.id
    }

    fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    fn apply_patch(&mut self, patch: &CommentPatch) {
        if let Some(comment) = &patch.comment {
            self.comment = comment.clone();
        }
        if let Some(rating) = patch.rating {
            self.rating = Some(rating);
        }
    }

    fn to_patch(&self) -> CommentPatch {
        CommentPatch {
            comment: Some(self.comment.clone()),
            rating: self.rating,
        }
    }

    fn provisional(
        resource_id: ResourceId,
        draft: &CommentDraft,
        identity: &Identity,
        now: Timestamp,
    ) -> Self {
        Self {
            id: provisional_id(),
            resource_id,
            comment: draft.comment.clone(),
            rating: draft.rating,
            timestamp: now,
            anonymous: !identity.is_authenticated(),
            user_id: identity.user_id().cloned(),
            device_id: identity.device_id().cloned(),
        }
    }

    fn owner_is_consistent(&self) -> bool {
        owner_consistent(self.anonymous, &self.user_id, &self.device_id)
    }
}

fn owner_consistent(anonymous: bool, user_id: &Option<UserId>, device_id: &Option<DeviceId>) -> bool {
    match (anonymous, user_id, device_id) {
        (true, None, Some(_)) => true,
        (false, Some(_), None) => true,
        _ => false,
    }
}

// ============================================================================
// FAVORITES
// ============================================================================

/// Which identity regime owns a favorite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Device,
    User,
}

/// A favorited resource. Created on add, removed on remove, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub kind: ResourceKind,
    pub resource_id: ResourceId,
    pub favorited_at: Timestamp,
    pub owner_kind: OwnerKind,
}

impl FavoriteEntry {
    pub fn matches(&self, kind: ResourceKind, resource_id: &ResourceId) -> bool {
        self.kind == kind && &self.resource_id == resource_id
    }
}

/// Requested favorite transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteAction {
    Add,
    Remove,
    Toggle,
}

/// Server confirmation of a favorite toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteToggle {
    pub favorited: bool,
    pub total_favorites: u64,
}

// ============================================================================
// AGGREGATE STATS
// ============================================================================

/// Server-computed aggregate for a resource. Never patched locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub average_rating: f64,
    pub total_ratings: u64,
    pub total_comments: u64,
    #[serde(default)]
    pub distribution: BTreeMap<u8, u64>,
}

impl AggregateStats {
    /// Fill missing star buckets with zero and drop out-of-range keys, so
    /// the distribution always covers exactly 1..=5.
    pub fn normalized(mut self) -> Self {
        self.distribution.retain(|star, _| (1..=5).contains(star));
        for star in 1..=5u8 {
            self.distribution.entry(star).or_insert(0);
        }
        self
    }
}
