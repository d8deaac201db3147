//! Create, update and delete with in-flight gating and cache reconciliation.
//!
//! The cache is only written with the server's canonical item. The
//! provisional item built for a create is exposed through
//! [`OptimisticMutationCoordinator::creating`] while the request is in
//! flight and is never inserted into the cache, so a create can neither
//! leave a ghost entry behind nor show up twice.

use chrono::Utc;
use platter_cache::{ResourceCache, StatsCache};
use platter_core::{
    CachedItem, EngineConfig, EngineError, EngineResult, Identity, ResourceId, ResourceKind,
    ReviewItem, ReviewsApi, StorageError,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::fetch::timed;
use crate::inflight::{InFlight, InFlightGuard};
use crate::session::Session;

type Provisionals<T> = Arc<RwLock<HashMap<ResourceId, T>>>;

/// Mutation coordinator for one item type of one resource kind.
pub struct OptimisticMutationCoordinator<T: ReviewItem> {
    kind: ResourceKind,
    cache: ResourceCache<T>,
    stats: StatsCache,
    api: Arc<dyn ReviewsApi>,
    session: Arc<Session>,
    config: EngineConfig,
    in_flight: InFlight,
    creating: Provisionals<T>,
}

impl<T: ReviewItem> OptimisticMutationCoordinator<T> {
    pub fn new(
        kind: ResourceKind,
        cache: ResourceCache<T>,
        stats: StatsCache,
        api: Arc<dyn ReviewsApi>,
        session: Arc<Session>,
        config: EngineConfig,
    ) -> Self {
        Self {
            kind,
            cache,
            stats,
            api,
            session,
            config,
            in_flight: InFlight::new(),
            creating: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn cache(&self) -> &ResourceCache<T> {
        &self.cache
    }

    /// The provisional item of a create in flight for `resource_id`.
    pub fn creating(&self, resource_id: &ResourceId) -> EngineResult<Option<T>> {
        let map = self
            .creating
            .read()
            .map_err(|_| StorageError::poisoned("pending creates"))?;
        Ok(map.get(resource_id).cloned())
    }

    pub fn is_creating(&self, resource_id: &ResourceId) -> EngineResult<bool> {
        Ok(self.creating(resource_id)?.is_some())
    }

    /// Create an item on `resource_id` under the current identity.
    ///
    /// Validation runs before anything else. On success the server's item is
    /// prepended to the cached page 1 and the resource's stats are dropped,
    /// unless the identity changed while the request was in flight.
    pub async fn create(&self, resource_id: &ResourceId, draft: T::Draft) -> EngineResult<T> {
        T::validate_draft(&draft, &self.config)?;
        let current = self.session.current()?;
        let identity = &current.identity;
        let _guard = self.in_flight.try_begin(
            self.resource_key(identity, resource_id),
            &self.target(resource_id.as_str()),
        )?;

        let provisional = T::provisional(resource_id.clone(), &draft, identity, Utc::now());
        let _pending = PendingCreate::begin(&self.creating, resource_id, provisional)?;

        debug!(kind = %self.kind, resource_id = %resource_id, regime = %identity.regime(), collection = %T::COLLECTION, "creating");
        let result = timed(
            &format!("create {}", T::COLLECTION),
            self.config.write_timeout,
            T::create(self.api.as_ref(), identity, self.kind, resource_id, &draft),
        )
        .await;
        let created = self.session.observe(&current, result)?;

        if self.session.is_current(current.epoch)? {
            self.cache.apply_created(resource_id, created.clone())?;
            self.stats.invalidate(self.kind, resource_id)?;
        } else {
            debug!(resource_id = %resource_id, "identity changed during create, cache left alone");
        }
        info!(kind = %self.kind, resource_id = %resource_id, item_id = %created.item_id(), collection = %T::COLLECTION, "created");
        Ok(created)
    }

    /// Update an item owned by the signed-in user.
    pub async fn update(&self, item_id: &str, patch: T::Patch) -> EngineResult<T> {
        let current = self.session.current()?;
        let identity = &current.identity;
        if !identity.is_authenticated() {
            return Err(EngineError::unauthorized(format!("update {}", T::COLLECTION)));
        }
        T::validate_patch(&patch, &self.config)?;
        let owner = self.cache.resource_of(item_id)?;
        let _guard = self.claim_item(identity, item_id, owner.as_ref())?;

        let result = timed(
            &format!("update {}", T::COLLECTION),
            self.config.write_timeout,
            T::update(self.api.as_ref(), identity, self.kind, item_id, &patch),
        )
        .await;
        let updated = self.session.observe(&current, result)?;

        if self.session.is_current(current.epoch)? {
            self.cache.apply_updated(item_id, &updated.to_patch())?;
            self.stats.invalidate(self.kind, updated.resource_id())?;
        }
        info!(kind = %self.kind, item_id, collection = %T::COLLECTION, "updated");
        Ok(updated)
    }

    /// Delete an item owned by the signed-in user.
    pub async fn delete(&self, item_id: &str) -> EngineResult<()> {
        let current = self.session.current()?;
        let identity = &current.identity;
        if !identity.is_authenticated() {
            return Err(EngineError::unauthorized(format!("delete {}", T::COLLECTION)));
        }
        let owner = self.cache.resource_of(item_id)?;
        let _guard = self.claim_item(identity, item_id, owner.as_ref())?;

        let result = timed(
            &format!("delete {}", T::COLLECTION),
            self.config.write_timeout,
            T::delete(self.api.as_ref(), identity, self.kind, item_id),
        )
        .await;
        self.session.observe(&current, result)?;

        if self.session.is_current(current.epoch)? {
            let touched = self.cache.apply_deleted(item_id)?;
            match owner.or_else(|| touched.into_iter().next()) {
                Some(resource_id) => {
                    self.stats.invalidate(self.kind, &resource_id)?;
                }
                None => {
                    // Owning resource unknown, any cached stats may be stale.
                    self.stats.invalidate_all()?;
                }
            }
        }
        info!(kind = %self.kind, item_id, collection = %T::COLLECTION, "deleted");
        Ok(())
    }

    fn resource_key(&self, identity: &Identity, resource_id: &ResourceId) -> String {
        format!("{}|{}|resource:{}", identity.owner_key(), self.kind, resource_id)
    }

    /// Gate an update or delete. The item key is always claimed so two
    /// mutations of one item exclude each other whether or not it is
    /// cached. The owning resource is claimed too when it is known.
    fn claim_item(
        &self,
        identity: &Identity,
        item_id: &str,
        owner: Option<&ResourceId>,
    ) -> EngineResult<InFlightGuard> {
        let mut keys = vec![format!("{}|{}|item:{}", identity.owner_key(), self.kind, item_id)];
        if let Some(resource_id) = owner {
            keys.push(self.resource_key(identity, resource_id));
        }
        self.in_flight.try_begin_all(keys, &self.target(item_id))
    }

    fn target(&self, target: &str) -> String {
        format!("{} {}", self.kind, target)
    }
}

/// Holds a provisional item in the creating map until dropped.
struct PendingCreate<T: CachedItem> {
    map: Provisionals<T>,
    resource_id: ResourceId,
}

impl<T: CachedItem> PendingCreate<T> {
    fn begin(map: &Provisionals<T>, resource_id: &ResourceId, item: T) -> EngineResult<Self> {
        map.write()
            .map_err(|_| StorageError::poisoned("pending creates"))?
            .insert(resource_id.clone(), item);
        Ok(Self {
            map: Arc::clone(map),
            resource_id: resource_id.clone(),
        })
    }
}

impl<T: CachedItem> Drop for PendingCreate<T> {
    fn drop(&mut self) {
        let mut map = self.map.write().unwrap_or_else(|e| e.into_inner());
        map.remove(&self.resource_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthIdentity;
    use crate::device::{DeviceIdentityProvider, DeviceRecord, FingerprintSource, MemoryDeviceStore};
    use crate::fetch::ApiCollectionFetcher;
    use platter_cache::Freshness;
    use platter_core::{
        BearerToken, Comment, CommentDraft, DeviceId, Rating, RatingDraft, RatingPatch, UserId,
    };
    use platter_test_utils::assertions::{
        assert_in_progress, assert_rating_out_of_range, assert_timeout, assert_unauthorized,
        assert_validation_error,
    };
    use platter_test_utils::{rating_fixture, ApiOp, MockReviewsApi};
    use std::time::Duration;

    struct Harness {
        api: MockReviewsApi,
        session: Arc<Session>,
        ratings: OptimisticMutationCoordinator<Rating>,
        stats: StatsCache,
    }

    fn harness() -> Harness {
        let api = MockReviewsApi::new();
        let store = MemoryDeviceStore::with_record(DeviceRecord {
            id: DeviceId::from("dev-123"),
            created_at: Utc::now(),
        });
        let device = DeviceIdentityProvider::new(Arc::new(store), FingerprintSource::default());
        let session = Arc::new(Session::new(Arc::new(AuthIdentity::new()), Arc::new(device)));
        let stats = StatsCache::new(Duration::from_secs(300));
        let ratings = OptimisticMutationCoordinator::new(
            ResourceKind::Dish,
            ResourceCache::new(ResourceKind::Dish, 10),
            stats.clone(),
            Arc::new(api.clone()),
            Arc::clone(&session),
            EngineConfig::default(),
        );
        Harness {
            api,
            session,
            ratings,
            stats,
        }
    }

    impl Harness {
        async fn load(&self, resource_id: &ResourceId) -> Vec<String> {
            let caller = self.session.current().unwrap();
            let fetcher =
                ApiCollectionFetcher::new(&self.api, &self.session, &caller, Duration::from_secs(8));
            let read = self
                .ratings
                .cache()
                .load(resource_id, 1, 10, Freshness::Cached, &fetcher)
                .await
                .unwrap();
            read.into_value().items.iter().map(|r| r.id.clone()).collect()
        }

        fn sign_in(&self, user: &str) {
            self.session
                .auth()
                .set_session(UserId::from(user), BearerToken::new("token"))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_prepends_canonical_item_once() {
        let h = harness();
        let d1 = ResourceId::from("d1");
        h.api.seed_ratings(ResourceKind::Dish, &d1, vec![rating_fixture("old", &d1, 3)]);
        assert_eq!(h.load(&d1).await, vec!["old"]);

        let created = h
            .ratings
            .create(&d1, RatingDraft::new(4).with_comment("great"))
            .await
            .unwrap();
        assert_eq!(created.device_id, Some(DeviceId::from("dev-123")));
        assert!(created.anonymous);
        assert!(!h.ratings.is_creating(&d1).unwrap());

        let calls_before = h.api.total_calls();
        assert_eq!(h.load(&d1).await, vec![created.id.as_str(), "old"]);
        assert_eq!(h.api.total_calls(), calls_before);
    }

    #[tokio::test]
    async fn test_validation_runs_before_network() {
        let h = harness();
        let d1 = ResourceId::from("d1");
        let result = h.ratings.create(&d1, RatingDraft::new(6)).await;
        assert_rating_out_of_range(&result, 6);
        assert_eq!(h.api.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_cache_untouched() {
        let h = harness();
        let d1 = ResourceId::from("d1");
        h.api.seed_ratings(ResourceKind::Dish, &d1, vec![rating_fixture("old", &d1, 3)]);
        h.load(&d1).await;
        h.api.fail_next(
            ApiOp::CreateRating,
            EngineError::Conflict {
                message: "already rated from this device".to_string(),
            },
        );
        let result = h.ratings.create(&d1, RatingDraft::new(4)).await;
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
        assert_eq!(h.load(&d1).await, vec!["old"]);
        assert!(!h.ratings.is_creating(&d1).unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_create_rejected_while_first_in_flight() {
        let h = harness();
        let d1 = ResourceId::from("d1");
        let gate = h.api.gate(ApiOp::CreateRating);

        let first = h.ratings.create(&d1, RatingDraft::new(5));
        let second = async {
            gate.entered().await;
            assert!(h.ratings.is_creating(&d1).unwrap());
            let rejected = h.ratings.create(&d1, RatingDraft::new(2)).await;
            gate.release();
            rejected
        };
        let (first, second) = tokio::join!(first, second);
        assert!(first.is_ok());
        assert_in_progress(&second);
        assert_eq!(h.api.call_count(ApiOp::CreateRating), 1);
    }

    #[test]
    fn test_poisoned_creating_map_is_reported() {
        let h = harness();
        let map = Arc::clone(&h.ratings.creating);
        let _ = std::thread::spawn(move || {
            let _held = map.write().unwrap();
            panic!("poison the pending creates");
        })
        .join();
        let d1 = ResourceId::from("d1");
        assert!(matches!(
            h.ratings.is_creating(&d1),
            Err(EngineError::Storage(StorageError::LockPoisoned {
                resource: "pending creates"
            }))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_require_authentication() {
        let h = harness();
        assert_unauthorized(&h.ratings.update("r1", RatingPatch::default()).await);
        assert_unauthorized(&h.ratings.delete("r1").await);
        assert_eq!(h.api.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_patches_cache_and_drops_stats() {
        let h = harness();
        h.sign_in("u-1");
        let d1 = ResourceId::from("d1");
        h.api.seed_ratings(ResourceKind::Dish, &d1, vec![rating_fixture("r1", &d1, 2)]);
        h.load(&d1).await;
        let fetcher = crate::fetch::ApiStatsFetcher::new(&h.api, Duration::from_secs(8));
        h.stats
            .get(ResourceKind::Dish, &d1, Freshness::Cached, &fetcher)
            .await
            .unwrap();

        let patch = RatingPatch {
            rating: Some(5),
            comment: None,
        };
        let updated = h.ratings.update("r1", patch).await.unwrap();
        assert_eq!(updated.rating, 5);
        let entry = h.ratings.cache().snapshot(&d1).unwrap().unwrap();
        assert_eq!(entry.get("r1").unwrap().rating, 5);
        assert!(h.stats.peek(ResourceKind::Dish, &d1).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_patch_rejected_locally() {
        let h = harness();
        h.sign_in("u-1");
        let patch = RatingPatch {
            rating: Some(0),
            comment: None,
        };
        assert_validation_error(&h.ratings.update("r1", patch).await);
        assert_eq!(h.api.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_from_cache() {
        let h = harness();
        h.sign_in("u-1");
        let d1 = ResourceId::from("d1");
        h.api.seed_ratings(
            ResourceKind::Dish,
            &d1,
            vec![rating_fixture("r2", &d1, 2), rating_fixture("r1", &d1, 4)],
        );
        h.load(&d1).await;
        h.ratings.delete("r2").await.unwrap();
        let entry = h.ratings.cache().snapshot(&d1).unwrap().unwrap();
        assert!(!entry.contains("r2"));
        assert_eq!(entry.cursor.total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_timeout_is_a_recoverable_error() {
        let h = harness();
        let d1 = ResourceId::from("d1");
        let _gate = h.api.gate(ApiOp::CreateRating);
        let result = h.ratings.create(&d1, RatingDraft::new(3)).await;
        assert_timeout(&result);
        assert!(!h.ratings.is_creating(&d1).unwrap());
        // The gate is released with the guard, a retry is accepted.
        h.api.clear_calls();
        assert!(h.ratings.create(&d1, RatingDraft::new(3)).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_session_signs_out_and_skips_write_back() {
        let h = harness();
        h.sign_in("u-1");
        let d1 = ResourceId::from("d1");
        h.api.fail_next(ApiOp::CreateRating, EngineError::SessionExpired);
        let result = h.ratings.create(&d1, RatingDraft::new(4)).await;
        assert!(matches!(result, Err(EngineError::SessionExpired)));
        assert!(!h.session.auth().is_authenticated().unwrap());
    }

    #[tokio::test]
    async fn test_late_expiry_leaves_next_user_signed_in() {
        let h = harness();
        h.sign_in("u-1");
        let d1 = ResourceId::from("d1");
        h.api.fail_next(ApiOp::CreateRating, EngineError::SessionExpired);
        let gate = h.api.gate(ApiOp::CreateRating);

        let create = h.ratings.create(&d1, RatingDraft::new(4));
        let switch = async {
            gate.entered().await;
            h.session.auth().clear_session().unwrap();
            h.sign_in("u-2");
            gate.release();
        };
        let (created, ()) = tokio::join!(create, switch);
        assert!(matches!(created, Err(EngineError::SessionExpired)));
        let current = h.session.auth().current().unwrap();
        assert!(current.is_authenticated);
        assert_eq!(current.user_id, Some(UserId::from("u-2")));
    }

    #[tokio::test]
    async fn test_delete_rejected_while_update_of_uncached_item_in_flight() {
        let h = harness();
        h.sign_in("u-1");
        let d1 = ResourceId::from("d1");
        h.api.seed_ratings(ResourceKind::Dish, &d1, vec![rating_fixture("r1", &d1, 2)]);
        let gate = h.api.gate(ApiOp::UpdateRating);
        let patch = RatingPatch {
            rating: Some(5),
            comment: None,
        };

        let update = h.ratings.update("r1", patch);
        let racer = async {
            gate.entered().await;
            assert_eq!(h.load(&d1).await, vec!["r1"]);
            let rejected = h.ratings.delete("r1").await;
            gate.release();
            rejected
        };
        let (updated, rejected) = tokio::join!(update, racer);
        assert_eq!(updated.unwrap().rating, 5);
        assert_in_progress(&rejected);
        assert_eq!(h.api.call_count(ApiOp::DeleteRating), 0);
        assert!(h.ratings.delete("r1").await.is_ok());
    }

    #[tokio::test]
    async fn test_update_of_cached_item_blocks_create_on_its_resource() {
        let h = harness();
        h.sign_in("u-1");
        let d1 = ResourceId::from("d1");
        h.api.seed_ratings(ResourceKind::Dish, &d1, vec![rating_fixture("r1", &d1, 2)]);
        h.load(&d1).await;
        let gate = h.api.gate(ApiOp::UpdateRating);

        let patch = RatingPatch {
            rating: None,
            comment: Some("better second time".to_string()),
        };
        let update = h.ratings.update("r1", patch);
        let racer = async {
            gate.entered().await;
            let rejected = h.ratings.create(&d1, RatingDraft::new(3)).await;
            gate.release();
            rejected
        };
        let (updated, rejected) = tokio::join!(update, racer);
        assert!(updated.is_ok());
        assert_in_progress(&rejected);
    }

    #[tokio::test]
    async fn test_create_across_login_does_not_write_back() {
        let h = harness();
        let d1 = ResourceId::from("d1");
        h.load(&d1).await;
        let gate = h.api.gate(ApiOp::CreateRating);

        let create = h.ratings.create(&d1, RatingDraft::new(4));
        let login = async {
            gate.entered().await;
            h.sign_in("u-1");
            gate.release();
        };
        let (created, ()) = tokio::join!(create, login);
        assert!(created.unwrap().anonymous);
        let entry = h.ratings.cache().snapshot(&d1).unwrap().unwrap();
        assert!(entry.is_empty());
    }

    #[tokio::test]
    async fn test_comment_bounds_checked() {
        let h = harness();
        let comments: OptimisticMutationCoordinator<Comment> = OptimisticMutationCoordinator::new(
            ResourceKind::Restaurant,
            ResourceCache::new(ResourceKind::Restaurant, 10),
            h.stats.clone(),
            Arc::new(h.api.clone()),
            Arc::clone(&h.session),
            EngineConfig::default(),
        );
        let r1 = ResourceId::from("r1");
        assert_validation_error(&comments.create(&r1, CommentDraft::new("  a ")).await);
        let created = comments.create(&r1, CommentDraft::new("lovely place")).await.unwrap();
        assert_eq!(created.comment, "lovely place");
    }
}
