//! Platter Test Utilities
//!
//! Shared test infrastructure for the Platter workspace:
//! - An in-memory [`MockReviewsApi`] with call recording, error injection
//!   and request gating
//! - Proptest generators for entity types
//! - Fixtures for common scenarios
//! - Assertions over [`EngineResult`]

pub use platter_core::{
    AggregateStats, BearerToken, CachedItem, Comment, CommentDraft, CommentPatch, DeviceId,
    EngineError, EngineResult, FavoriteAction, FavoriteEntry, FavoriteToggle, Identity, OwnerKind,
    Page, PaginationCursor, Rating, RatingDraft, RatingPatch, ResourceId, ResourceKind, ReviewsApi,
    Timestamp, UserId,
};

pub use fixtures::{comment_fixture, page_of, rating_fixture};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

// ============================================================================
// MOCK REVIEWS API
// ============================================================================

/// Remote operation, used to address recorded calls, injected errors and
/// gates on [`MockReviewsApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOp {
    ListRatings,
    ListComments,
    CreateRating,
    CreateComment,
    UpdateRating,
    UpdateComment,
    DeleteRating,
    DeleteComment,
    ToggleFavorite,
    ListFavorites,
    GetStats,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub op: ApiOp,
    /// `device:...` or `user:...`; `None` for identity-less calls.
    pub owner: Option<String>,
    /// Whether a bearer token was presented.
    pub authenticated: bool,
    pub kind: Option<ResourceKind>,
    /// Resource id or item id the call addressed.
    pub target: Option<String>,
    pub page: Option<u32>,
}

/// Holds one call of an operation until released.
///
/// Obtained from [`MockReviewsApi::gate`]. The next call of the gated
/// operation signals [`Gate::entered`] and then waits for
/// [`Gate::release`].
#[derive(Clone)]
pub struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    /// Wait until the gated call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the gated call proceed.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

type Bucket = (ResourceKind, ResourceId);

#[derive(Default)]
struct ServerState {
    ratings: HashMap<Bucket, Vec<Rating>>,
    comments: HashMap<Bucket, Vec<Comment>>,
    favorites: HashMap<String, Vec<FavoriteEntry>>,
    stats: HashMap<Bucket, AggregateStats>,
    calls: Vec<ApiCall>,
    failures: HashMap<ApiOp, VecDeque<EngineError>>,
    gates: HashMap<ApiOp, Gate>,
    next_id: u64,
}

/// In-memory stand-in for the remote review API.
///
/// Collections are stored newest-first and served in pages the way the
/// real server does. Created items get ids `srv-1`, `srv-2`, ... and are
/// owned by the calling identity. Stats are derived from stored ratings
/// unless overridden with [`MockReviewsApi::set_stats`].
#[derive(Clone, Default)]
pub struct MockReviewsApi {
    state: Arc<Mutex<ServerState>>,
}

impl MockReviewsApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Seeding ===

    /// Replace the server-side ratings of a resource (newest first).
    pub fn seed_ratings(&self, kind: ResourceKind, resource_id: &ResourceId, ratings: Vec<Rating>) {
        self.lock().ratings.insert((kind, resource_id.clone()), ratings);
    }

    /// Replace the server-side comments of a resource (newest first).
    pub fn seed_comments(&self, kind: ResourceKind, resource_id: &ResourceId, comments: Vec<Comment>) {
        self.lock().comments.insert((kind, resource_id.clone()), comments);
    }

    /// Replace the favorites stored for an identity (newest first).
    pub fn seed_favorites(&self, identity: &Identity, entries: Vec<FavoriteEntry>) {
        self.lock().favorites.insert(identity.owner_key(), entries);
    }

    pub fn set_stats(&self, kind: ResourceKind, resource_id: &ResourceId, stats: AggregateStats) {
        self.lock().stats.insert((kind, resource_id.clone()), stats);
    }

    // === Fault injection ===

    /// Fail the next call of `op` with `error`. Queued errors are consumed
    /// in order, one per call.
    pub fn fail_next(&self, op: ApiOp, error: EngineError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Hold the next call of `op` until the returned gate is released.
    pub fn gate(&self, op: ApiOp) -> Gate {
        let gate = Gate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        self.lock().gates.insert(op, gate.clone());
        gate
    }

    // === Inspection ===

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, op: ApiOp) -> Vec<ApiCall> {
        self.lock().calls.iter().filter(|c| c.op == op).cloned().collect()
    }

    pub fn call_count(&self, op: ApiOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn server_ratings(&self, kind: ResourceKind, resource_id: &ResourceId) -> Vec<Rating> {
        self.lock()
            .ratings
            .get(&(kind, resource_id.clone()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn server_favorites(&self, identity: &Identity) -> Vec<FavoriteEntry> {
        self.lock()
            .favorites
            .get(&identity.owner_key())
            .cloned()
            .unwrap_or_default()
    }

    /// Record the call, then apply any gate and injected failure.
    async fn enter(&self, call: ApiCall) -> EngineResult<()> {
        let op = call.op;
        let (gate, failure) = {
            let mut state = self.lock();
            state.calls.push(call);
            let gate = state.gates.remove(&op);
            let failure = state.failures.get_mut(&op).and_then(VecDeque::pop_front);
            (gate, failure)
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_server_id(&self) -> String {
        let mut state = self.lock();
        state.next_id += 1;
        format!("srv-{}", state.next_id)
    }
}

fn call(op: ApiOp, identity: Option<&Identity>) -> ApiCall {
    ApiCall {
        op,
        owner: identity.map(Identity::owner_key),
        authenticated: identity.is_some_and(Identity::is_authenticated),
        kind: None,
        target: None,
        page: None,
    }
}

fn on(mut call: ApiCall, kind: ResourceKind, target: impl Into<String>) -> ApiCall {
    call.kind = Some(kind);
    call.target = Some(target.into());
    call
}

fn paginate<T: Clone>(items: &[T], page: u32, limit: u32) -> Page<T> {
    let cursor = PaginationCursor::for_local(items.len() as u64, page, limit);
    let start = ((cursor.page - 1) * cursor.limit) as usize;
    Page {
        items: items.iter().skip(start).take(cursor.limit as usize).cloned().collect(),
        pagination: cursor,
    }
}

fn require_user(identity: &Identity, operation: &str) -> EngineResult<()> {
    if identity.is_authenticated() {
        Ok(())
    } else {
        Err(EngineError::unauthorized(operation))
    }
}

#[async_trait]
impl ReviewsApi for MockReviewsApi {
    async fn list_ratings(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<Rating>> {
        let mut c = on(call(ApiOp::ListRatings, Some(identity)), kind, resource_id.as_str());
        c.page = Some(page);
        self.enter(c).await?;
        let state = self.lock();
        let items = state.ratings.get(&(kind, resource_id.clone()));
        Ok(paginate(items.map(Vec::as_slice).unwrap_or_default(), page, limit))
    }

    async fn list_comments(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<Comment>> {
        let mut c = on(call(ApiOp::ListComments, Some(identity)), kind, resource_id.as_str());
        c.page = Some(page);
        self.enter(c).await?;
        let state = self.lock();
        let items = state.comments.get(&(kind, resource_id.clone()));
        Ok(paginate(items.map(Vec::as_slice).unwrap_or_default(), page, limit))
    }

    async fn create_rating(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: &RatingDraft,
    ) -> EngineResult<Rating> {
        self.enter(on(call(ApiOp::CreateRating, Some(identity)), kind, resource_id.as_str()))
            .await?;
        let mut rating = Rating::provisional(resource_id.clone(), draft, identity, Utc::now());
        rating.id = self.next_server_id();
        self.lock()
            .ratings
            .entry((kind, resource_id.clone()))
            .or_default()
            .insert(0, rating.clone());
        Ok(rating)
    }

    async fn create_comment(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: &CommentDraft,
    ) -> EngineResult<Comment> {
        self.enter(on(call(ApiOp::CreateComment, Some(identity)), kind, resource_id.as_str()))
            .await?;
        let mut comment = Comment::provisional(resource_id.clone(), draft, identity, Utc::now());
        comment.id = self.next_server_id();
        self.lock()
            .comments
            .entry((kind, resource_id.clone()))
            .or_default()
            .insert(0, comment.clone());
        Ok(comment)
    }

    async fn update_rating(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        rating_id: &str,
        patch: &RatingPatch,
    ) -> EngineResult<Rating> {
        self.enter(on(call(ApiOp::UpdateRating, Some(identity)), kind, rating_id))
            .await?;
        require_user(identity, "update ratings")?;
        let mut state = self.lock();
        state
            .ratings
            .iter_mut()
            .filter(|((k, _), _)| *k == kind)
            .flat_map(|(_, items)| items.iter_mut())
            .find(|r| r.id == rating_id)
            .map(|r| {
                r.apply_patch(patch);
                r.clone()
            })
            .ok_or_else(|| EngineError::not_found(format!("rating {}", rating_id)))
    }

    async fn delete_rating(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        rating_id: &str,
    ) -> EngineResult<()> {
        self.enter(on(call(ApiOp::DeleteRating, Some(identity)), kind, rating_id))
            .await?;
        require_user(identity, "delete ratings")?;
        let mut state = self.lock();
        let mut found = false;
        for ((k, _), items) in state.ratings.iter_mut() {
            if *k == kind {
                let before = items.len();
                items.retain(|r| r.id != rating_id);
                found |= items.len() != before;
            }
        }
        if found {
            Ok(())
        } else {
            Err(EngineError::not_found(format!("rating {}", rating_id)))
        }
    }

    async fn update_comment(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        comment_id: &str,
        patch: &CommentPatch,
    ) -> EngineResult<Comment> {
        self.enter(on(call(ApiOp::UpdateComment, Some(identity)), kind, comment_id))
            .await?;
        require_user(identity, "update comments")?;
        let mut state = self.lock();
        state
            .comments
            .iter_mut()
            .filter(|((k, _), _)| *k == kind)
            .flat_map(|(_, items)| items.iter_mut())
            .find(|c| c.id == comment_id)
            .map(|c| {
                c.apply_patch(patch);
                c.clone()
            })
            .ok_or_else(|| EngineError::not_found(format!("comment {}", comment_id)))
    }

    async fn delete_comment(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        comment_id: &str,
    ) -> EngineResult<()> {
        self.enter(on(call(ApiOp::DeleteComment, Some(identity)), kind, comment_id))
            .await?;
        require_user(identity, "delete comments")?;
        let mut state = self.lock();
        let mut found = false;
        for ((k, _), items) in state.comments.iter_mut() {
            if *k == kind {
                let before = items.len();
                items.retain(|c| c.id != comment_id);
                found |= items.len() != before;
            }
        }
        if found {
            Ok(())
        } else {
            Err(EngineError::not_found(format!("comment {}", comment_id)))
        }
    }

    async fn toggle_favorite(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        action: FavoriteAction,
    ) -> EngineResult<FavoriteToggle> {
        self.enter(on(call(ApiOp::ToggleFavorite, Some(identity)), kind, resource_id.as_str()))
            .await?;
        let mut state = self.lock();
        let owner_kind = if identity.is_authenticated() {
            OwnerKind::User
        } else {
            OwnerKind::Device
        };
        let entries = state.favorites.entry(identity.owner_key()).or_default();
        let present = entries.iter().any(|e| e.matches(kind, resource_id));
        let favorite = match action {
            FavoriteAction::Add => true,
            FavoriteAction::Remove => false,
            FavoriteAction::Toggle => !present,
        };
        if favorite && !present {
            entries.insert(
                0,
                FavoriteEntry {
                    kind,
                    resource_id: resource_id.clone(),
                    favorited_at: Utc::now(),
                    owner_kind,
                },
            );
        } else if !favorite {
            entries.retain(|e| !e.matches(kind, resource_id));
        }
        let total_favorites = state
            .favorites
            .values()
            .flatten()
            .filter(|e| e.matches(kind, resource_id))
            .count() as u64;
        Ok(FavoriteToggle {
            favorited: favorite,
            total_favorites,
        })
    }

    async fn list_favorites(
        &self,
        identity: &Identity,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<FavoriteEntry>> {
        let mut c = call(ApiOp::ListFavorites, Some(identity));
        c.page = Some(page);
        self.enter(c).await?;
        let state = self.lock();
        let items = state.favorites.get(&identity.owner_key());
        Ok(paginate(items.map(Vec::as_slice).unwrap_or_default(), page, limit))
    }

    async fn get_stats(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> EngineResult<AggregateStats> {
        self.enter(on(call(ApiOp::GetStats, None), kind, resource_id.as_str()))
            .await?;
        let state = self.lock();
        let key = (kind, resource_id.clone());
        if let Some(stats) = state.stats.get(&key) {
            return Ok(stats.clone());
        }
        let ratings = state.ratings.get(&key).map(Vec::as_slice).unwrap_or_default();
        let total_comments = state.comments.get(&key).map(Vec::len).unwrap_or_default() as u64;
        let mut distribution = BTreeMap::new();
        for rating in ratings {
            *distribution.entry(rating.rating).or_insert(0u64) += 1;
        }
        let total_ratings = ratings.len() as u64;
        let sum: u64 = ratings.iter().map(|r| u64::from(r.rating)).sum();
        Ok(AggregateStats {
            average_rating: if total_ratings == 0 {
                0.0
            } else {
                sum as f64 / total_ratings as f64
            },
            total_ratings,
            total_comments,
            distribution,
        })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Platter entity types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_resource_kind() -> impl Strategy<Value = ResourceKind> {
        prop_oneof![Just(ResourceKind::Dish), Just(ResourceKind::Restaurant)]
    }

    pub fn arb_resource_id() -> impl Strategy<Value = ResourceId> {
        "[a-z]{1,3}[0-9]{1,4}".prop_map(ResourceId::new)
    }

    /// Star value, including out-of-range ones.
    pub fn arb_star() -> impl Strategy<Value = u8> {
        0u8..=9
    }

    pub fn arb_valid_star() -> impl Strategy<Value = u8> {
        1u8..=5
    }

    /// Comment text of 0 to 600 characters, with optional padding whitespace.
    pub fn arb_comment_text() -> impl Strategy<Value = String> {
        ("[ ]{0,3}", "[a-zA-Z0-9 .,!]{0,600}", "[ ]{0,3}")
            .prop_map(|(lead, body, trail)| format!("{lead}{body}{trail}"))
    }

    pub fn arb_identity() -> impl Strategy<Value = Identity> {
        prop_oneof![
            "dev-[a-z0-9]{6}".prop_map(|d| Identity::anonymous(DeviceId::new(d))),
            ("u-[0-9]{1,4}", "[a-zA-Z0-9]{16}").prop_map(|(u, t)| {
                Identity::authenticated(UserId::new(u), BearerToken::new(t))
            }),
        ]
    }

    pub fn arb_rating_draft() -> impl Strategy<Value = RatingDraft> {
        (arb_star(), proptest::option::of(arb_comment_text()))
            .prop_map(|(rating, comment)| RatingDraft { rating, comment })
    }

    /// Server-side rating with a consistent owner.
    pub fn arb_rating(resource_id: ResourceId) -> impl Strategy<Value = Rating> {
        ("[a-z0-9]{8}", arb_valid_star(), arb_identity()).prop_map(move |(id, star, identity)| {
            let mut rating =
                Rating::provisional(resource_id.clone(), &RatingDraft::new(star), &identity, Utc::now());
            rating.id = format!("srv-{id}");
            rating
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    pub const FIXTURE_DEVICE: &str = "dev-fixture";

    pub fn anonymous_identity(device_id: &str) -> Identity {
        Identity::anonymous(DeviceId::from(device_id))
    }

    pub fn authenticated_identity(user_id: &str) -> Identity {
        Identity::authenticated(UserId::from(user_id), BearerToken::new(format!("token-{user_id}")))
    }

    /// Anonymous rating with a fixed id, owned by [`FIXTURE_DEVICE`].
    pub fn rating_fixture(id: &str, resource_id: &ResourceId, stars: u8) -> Rating {
        Rating {
            id: id.to_string(),
            resource_id: resource_id.clone(),
            rating: stars,
            comment: None,
            timestamp: Utc::now(),
            anonymous: true,
            user_id: None,
            device_id: Some(DeviceId::from(FIXTURE_DEVICE)),
        }
    }

    /// Anonymous comment with a fixed id, owned by [`FIXTURE_DEVICE`].
    pub fn comment_fixture(id: &str, resource_id: &ResourceId, text: &str) -> Comment {
        Comment {
            id: id.to_string(),
            resource_id: resource_id.clone(),
            comment: text.to_string(),
            rating: None,
            timestamp: Utc::now(),
            anonymous: true,
            user_id: None,
            device_id: Some(DeviceId::from(FIXTURE_DEVICE)),
        }
    }

    pub fn favorite_fixture(kind: ResourceKind, resource_id: &str, owner_kind: OwnerKind) -> FavoriteEntry {
        FavoriteEntry {
            kind,
            resource_id: ResourceId::from(resource_id),
            favorited_at: Utc::now(),
            owner_kind,
        }
    }

    /// Build a page as the server would report it.
    pub fn page_of<T>(items: Vec<T>, page: u32, limit: u32, total: u64) -> Page<T> {
        Page {
            items,
            pagination: PaginationCursor::for_local(total, page, limit),
        }
    }

    /// `count` anonymous ratings `r0..` on one resource, newest first.
    pub fn rating_series(resource_id: &ResourceId, count: usize) -> Vec<Rating> {
        (0..count)
            .map(|i| rating_fixture(&format!("r{i}"), resource_id, (i % 5) as u8 + 1))
            .collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over engine results.

    use super::*;
    use platter_core::ValidationError;

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &EngineResult<T>) {
        match result {
            Err(EngineError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_rating_out_of_range<T: std::fmt::Debug>(result: &EngineResult<T>, value: u8) {
        match result {
            Err(EngineError::Validation(ValidationError::RatingOutOfRange { value: v })) => {
                assert_eq!(*v, value, "Wrong value in RatingOutOfRange");
            }
            other => panic!("Expected RatingOutOfRange({}), got: {:?}", value, other),
        }
    }

    #[track_caller]
    pub fn assert_unauthorized<T: std::fmt::Debug>(result: &EngineResult<T>) {
        match result {
            Err(EngineError::Unauthorized { .. }) => {}
            other => panic!("Expected Unauthorized error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_in_progress<T: std::fmt::Debug>(result: &EngineResult<T>) {
        match result {
            Err(EngineError::OperationInProgress { .. }) => {}
            other => panic!("Expected OperationInProgress error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_timeout<T: std::fmt::Debug>(result: &EngineResult<T>) {
        match result {
            Err(EngineError::Timeout { .. }) => {}
            other => panic!("Expected Timeout error, got: {:?}", other),
        }
    }

    /// Assert that cached ids are in the given order.
    #[track_caller]
    pub fn assert_ids<T: CachedItem>(items: &[T], expected: &[&str]) {
        let actual: Vec<&str> = items.iter().map(|i| i.item_id()).collect();
        assert_eq!(actual, expected, "Unexpected item order");
    }
}

// ============================================================================
// TESTS
// ============================================================================
