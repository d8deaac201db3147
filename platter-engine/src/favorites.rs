//! Favorites for the current identity regime.
//!
//! Each regime has its own list behind a [`FavoritesStrategy`]:
//!
//! - [`DeviceFavorites`] keeps the anonymous list on the device and pages
//!   it locally.
//! - [`UserFavorites`] remembers what the server confirmed for the
//!   signed-in user and pages `GET /favorites`.
//!
//! The lists are never merged. Which one is authoritative follows the
//! identity of each call, and the published [`FavoritesView`] always shows
//! the list of the current regime. Toggles are not applied optimistically:
//! the local list changes only after the server confirms.

use async_trait::async_trait;
use chrono::Utc;
use platter_core::{
    EngineConfig, EngineError, EngineResult, FavoriteAction, FavoriteEntry, FavoriteToggle, Identity,
    IdentityRegime, OwnerKind, Page, PaginationCursor, ResourceId, ResourceKind, ReviewsApi,
    StorageError, Timestamp,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::AuthTransition;
use crate::fetch::timed;
use crate::inflight::InFlight;
use crate::persistence::JsonFile;
use crate::session::Session;
use crate::transition::IdentityScoped;

/// What subscribers see: the loaded pages of the authoritative list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoritesView {
    pub regime: IdentityRegime,
    pub entries: Vec<FavoriteEntry>,
    pub cursor: PaginationCursor,
    pub loading: bool,
}

impl FavoritesView {
    fn empty(regime: IdentityRegime, limit: u32) -> Self {
        Self {
            regime,
            entries: Vec::new(),
            cursor: PaginationCursor::empty(limit),
            loading: false,
        }
    }

    /// Whether at least one page has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cursor.page > 0
    }

    pub fn contains(&self, kind: ResourceKind, resource_id: &ResourceId) -> bool {
        self.entries.iter().any(|e| e.matches(kind, resource_id))
    }
}

/// Outcome of [`FavoritesReconciler::load_more`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoritesLoad {
    Loaded(FavoritesView),
    /// The cursor reports no further pages; nothing was requested.
    NoMorePages,
}

impl FavoritesLoad {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::NoMorePages)
    }
}

/// One regime's favorites list.
#[async_trait]
pub trait FavoritesStrategy: Send + Sync {
    fn regime(&self) -> IdentityRegime;

    /// Fetch one page of the list.
    async fn page(
        &self,
        api: &dyn ReviewsApi,
        identity: &Identity,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<FavoriteEntry>>;

    fn contains(&self, kind: ResourceKind, resource_id: &ResourceId) -> EngineResult<bool>;

    /// Apply a server-confirmed favorite state.
    fn confirm(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        favorited: bool,
        at: Timestamp,
    ) -> EngineResult<()>;

    /// Entries seen on a loaded page.
    fn observe_page(&self, entries: &[FavoriteEntry]) -> EngineResult<()>;

    /// Forget everything held in memory for this list.
    fn purge(&self) -> EngineResult<usize>;
}

// ============================================================================
// DEVICE LIST
// ============================================================================

/// Anonymous favorites, persisted on the device (newest first).
pub struct DeviceFavorites {
    entries: RwLock<Vec<FavoriteEntry>>,
    file: Option<JsonFile<Vec<FavoriteEntry>>>,
}

impl DeviceFavorites {
    pub const FILE_NAME: &'static str = "favorites.json";

    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            file: None,
        }
    }

    /// Open the list stored at `path`; unreadable files start empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let file = JsonFile::new(path, "device favorites");
        let entries = match file.load() {
            Ok(entries) => entries.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "device favorites unreadable, starting empty");
                Vec::new()
            }
        };
        Self {
            entries: RwLock::new(entries),
            file: Some(file),
        }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::open(dir.into().join(Self::FILE_NAME))
    }

    pub fn entries(&self) -> EngineResult<Vec<FavoriteEntry>> {
        Ok(self.entries.read().map_err(|_| StorageError::poisoned("device favorites"))?.clone())
    }

    /// Remove every device favorite, on disk too.
    pub fn clear(&self) -> EngineResult<()> {
        self.entries
            .write()
            .map_err(|_| StorageError::poisoned("device favorites"))?
            .clear();
        if let Some(file) = &self.file {
            file.remove()?;
        }
        Ok(())
    }

    fn local_page(&self, page: u32, limit: u32) -> EngineResult<Page<FavoriteEntry>> {
        let entries = self.entries.read().map_err(|_| StorageError::poisoned("device favorites"))?;
        let cursor = PaginationCursor::for_local(entries.len() as u64, page, limit);
        let start = (cursor.page as usize - 1) * cursor.limit as usize;
        Ok(Page {
            items: entries
                .iter()
                .skip(start)
                .take(cursor.limit as usize)
                .cloned()
                .collect(),
            pagination: cursor,
        })
    }
}

#[async_trait]
impl FavoritesStrategy for DeviceFavorites {
    fn regime(&self) -> IdentityRegime {
        IdentityRegime::Anonymous
    }

    async fn page(
        &self,
        _api: &dyn ReviewsApi,
        _identity: &Identity,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<FavoriteEntry>> {
        self.local_page(page, limit)
    }

    fn contains(&self, kind: ResourceKind, resource_id: &ResourceId) -> EngineResult<bool> {
        let entries = self.entries.read().map_err(|_| StorageError::poisoned("device favorites"))?;
        Ok(entries.iter().any(|e| e.matches(kind, resource_id)))
    }

    fn confirm(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        favorited: bool,
        at: Timestamp,
    ) -> EngineResult<()> {
        let snapshot = {
            let mut entries = self.entries.write().map_err(|_| StorageError::poisoned("device favorites"))?;
            let present = entries.iter().any(|e| e.matches(kind, resource_id));
            if favorited == present {
                return Ok(());
            }
            if favorited {
                entries.insert(
                    0,
                    FavoriteEntry {
                        kind,
                        resource_id: resource_id.clone(),
                        favorited_at: at,
                        owner_kind: OwnerKind::Device,
                    },
                );
            } else {
                entries.retain(|e| !e.matches(kind, resource_id));
            }
            entries.clone()
        };
        if let Some(file) = &self.file {
            if let Err(err) = file.save(&snapshot) {
                warn!(error = %err, "could not persist device favorites");
            }
        }
        Ok(())
    }

    fn observe_page(&self, _entries: &[FavoriteEntry]) -> EngineResult<()> {
        Ok(())
    }

    fn purge(&self) -> EngineResult<usize> {
        // Device-scoped, survives identity transitions.
        Ok(0)
    }
}

// ============================================================================
// USER LIST
// ============================================================================

/// Server-confirmed favorites of the signed-in user, held in memory only.
#[derive(Default)]
pub struct UserFavorites {
    confirmed: RwLock<Vec<(ResourceKind, ResourceId)>>,
}

impl UserFavorites {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FavoritesStrategy for UserFavorites {
    fn regime(&self) -> IdentityRegime {
        IdentityRegime::Authenticated
    }

    async fn page(
        &self,
        api: &dyn ReviewsApi,
        identity: &Identity,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<FavoriteEntry>> {
        api.list_favorites(identity, page, limit).await
    }

    fn contains(&self, kind: ResourceKind, resource_id: &ResourceId) -> EngineResult<bool> {
        let confirmed = self.confirmed.read().map_err(|_| StorageError::poisoned("user favorites"))?;
        Ok(confirmed.iter().any(|(k, id)| *k == kind && id == resource_id))
    }

    fn confirm(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        favorited: bool,
        _at: Timestamp,
    ) -> EngineResult<()> {
        let mut confirmed = self.confirmed.write().map_err(|_| StorageError::poisoned("user favorites"))?;
        confirmed.retain(|(k, id)| !(*k == kind && id == resource_id));
        if favorited {
            confirmed.push((kind, resource_id.clone()));
        }
        Ok(())
    }

    fn observe_page(&self, entries: &[FavoriteEntry]) -> EngineResult<()> {
        let mut confirmed = self.confirmed.write().map_err(|_| StorageError::poisoned("user favorites"))?;
        for entry in entries {
            if !confirmed
                .iter()
                .any(|(k, id)| *k == entry.kind && *id == entry.resource_id)
            {
                confirmed.push((entry.kind, entry.resource_id.clone()));
            }
        }
        Ok(())
    }

    fn purge(&self) -> EngineResult<usize> {
        let mut confirmed = self.confirmed.write().map_err(|_| StorageError::poisoned("user favorites"))?;
        let dropped = confirmed.len();
        confirmed.clear();
        Ok(dropped)
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

struct ViewState {
    view: FavoritesView,
    /// Bumped on every purge; loads started before it drop their result.
    generation: u64,
}

/// Favorites of the current identity, with a reactive view.
pub struct FavoritesReconciler {
    device: Arc<DeviceFavorites>,
    user: Arc<UserFavorites>,
    api: Arc<dyn ReviewsApi>,
    session: Arc<Session>,
    config: EngineConfig,
    in_flight: InFlight,
    state: Mutex<ViewState>,
    publisher: watch::Sender<FavoritesView>,
}

impl FavoritesReconciler {
    pub fn new(
        device: Arc<DeviceFavorites>,
        user: Arc<UserFavorites>,
        api: Arc<dyn ReviewsApi>,
        session: Arc<Session>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let regime = session.regime()?;
        let view = FavoritesView::empty(regime, config.default_page_limit);
        let (publisher, _) = watch::channel(view.clone());
        Ok(Self {
            device,
            user,
            api,
            session,
            config,
            in_flight: InFlight::new(),
            state: Mutex::new(ViewState {
                view,
                generation: 0,
            }),
            publisher,
        })
    }

    pub fn device_list(&self) -> &Arc<DeviceFavorites> {
        &self.device
    }

    /// Receiver of the current view. It follows identity transitions, so it
    /// never needs to be replaced.
    pub fn subscribe(&self) -> watch::Receiver<FavoritesView> {
        self.publisher.subscribe()
    }

    pub fn view(&self) -> FavoritesView {
        self.publisher.borrow().clone()
    }

    /// Whether `resource_id` is a favorite in the list of the current
    /// regime. No network call.
    pub fn is_favorite(&self, kind: ResourceKind, resource_id: &ResourceId) -> EngineResult<bool> {
        let regime = self.session.regime()?;
        self.strategy(regime).contains(kind, resource_id)
    }

    /// Add, remove or flip a favorite through the server.
    ///
    /// The local list is updated to the server's answer only after it
    /// arrives. A failure leaves the list unchanged.
    pub async fn toggle(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        action: FavoriteAction,
    ) -> EngineResult<FavoriteToggle> {
        let current = self.session.current()?;
        let identity = &current.identity;
        let target = format!("{} {}", kind, resource_id);
        let _guard = self.in_flight.try_begin(
            format!("{}|favorite|{}|{}", identity.owner_key(), kind, resource_id),
            &target,
        )?;

        let result = timed(
            "toggle favorite",
            self.config.favorite_timeout,
            self.api.toggle_favorite(identity, kind, resource_id, action),
        )
        .await;
        let confirmed = self.session.observe(&current, result)?;

        if !self.session.is_current(current.epoch)? {
            debug!(resource_id = %resource_id, "identity changed during toggle, list left alone");
            return Ok(confirmed);
        }
        let regime = identity.regime();
        let now = Utc::now();
        self.strategy(regime)
            .confirm(kind, resource_id, confirmed.favorited, now)?;
        self.update_view(|view| {
            if view.regime != regime || !view.is_loaded() {
                return;
            }
            let present = view.contains(kind, resource_id);
            if confirmed.favorited && !present {
                view.entries.insert(
                    0,
                    FavoriteEntry {
                        kind,
                        resource_id: resource_id.clone(),
                        favorited_at: now,
                        owner_kind: owner_kind(regime),
                    },
                );
                view.cursor.total += 1;
            } else if !confirmed.favorited && present {
                view.entries.retain(|e| !e.matches(kind, resource_id));
                view.cursor.total = view.cursor.total.saturating_sub(1);
            }
        })?;
        info!(kind = %kind, resource_id = %resource_id, favorited = confirmed.favorited, total = confirmed.total_favorites, "favorite confirmed");
        Ok(confirmed)
    }

    /// Load a page of the current regime's list into the view.
    ///
    /// Page 1 replaces the view and is served from it when already loaded
    /// unless `force` is set. Later pages append.
    pub async fn load_favorites(&self, limit: u32, page: u32, force: bool) -> EngineResult<FavoritesView> {
        let page = page.max(1);
        let limit = limit.max(1);
        let current = self.session.current()?;
        let identity = &current.identity;
        let regime = identity.regime();

        let generation = {
            let mut state = self.lock()?;
            if page == 1 && !force && state.view.regime == regime && state.view.is_loaded() {
                debug!(regime = %regime, "favorites served from view");
                return Ok(state.view.clone());
            }
            if state.view.regime != regime {
                state.view = FavoritesView::empty(regime, limit);
            }
            state.view.loading = true;
            self.publisher.send_replace(state.view.clone());
            state.generation
        };

        let result = match regime {
            IdentityRegime::Anonymous => self.device.page(self.api.as_ref(), identity, page, limit).await,
            IdentityRegime::Authenticated => {
                let result = timed(
                    "load favorites",
                    self.config.favorite_timeout,
                    self.user.page(self.api.as_ref(), identity, page, limit),
                )
                .await;
                self.session.observe(&current, result)
            }
        };

        let mut state = self.lock()?;
        if state.generation != generation || state.view.regime != regime {
            result?;
            return Err(EngineError::Superseded {
                what: "favorites".to_string(),
            });
        }
        state.view.loading = false;
        let fetched = match result {
            Ok(fetched) => fetched,
            Err(err) => {
                self.publisher.send_replace(state.view.clone());
                warn!(error = %err, "favorites load failed, keeping previous view");
                return Err(err);
            }
        };
        self.strategy(regime).observe_page(&fetched.items)?;
        if page == 1 {
            state.view.entries = fetched.items;
        } else {
            state.view.entries.extend(fetched.items);
        }
        state.view.cursor = fetched.pagination;
        self.publisher.send_replace(state.view.clone());
        Ok(state.view.clone())
    }

    /// Load the page after the view's cursor, or report that there is none.
    pub async fn load_more(&self) -> EngineResult<FavoritesLoad> {
        let regime = self.session.regime()?;
        let cursor = {
            let state = self.lock()?;
            (state.view.regime == regime && state.view.is_loaded()).then_some(state.view.cursor)
        };
        let view = match cursor {
            None => self.load_favorites(self.config.default_page_limit, 1, false).await?,
            Some(cursor) if !cursor.has_next => {
                debug!("no more favorites");
                return Ok(FavoritesLoad::NoMorePages);
            }
            Some(cursor) => self.load_favorites(cursor.limit, cursor.next_page(), true).await?,
        };
        Ok(FavoritesLoad::Loaded(view))
    }

    /// Forget the device list and reset the view if it showed it.
    pub fn clear_device_list(&self) -> EngineResult<()> {
        self.device.clear()?;
        self.update_view(|view| {
            if view.regime == IdentityRegime::Anonymous {
                *view = FavoritesView::empty(view.regime, view.cursor.limit);
            }
        })
    }

    fn strategy(&self, regime: IdentityRegime) -> &dyn FavoritesStrategy {
        match regime {
            IdentityRegime::Anonymous => self.device.as_ref(),
            IdentityRegime::Authenticated => self.user.as_ref(),
        }
    }

    fn update_view(&self, apply: impl FnOnce(&mut FavoritesView)) -> EngineResult<()> {
        let mut state = self.lock()?;
        apply(&mut state.view);
        self.publisher.send_replace(state.view.clone());
        Ok(())
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, ViewState>> {
        Ok(self.state.lock().map_err(|_| StorageError::poisoned("favorites view"))?)
    }
}

impl IdentityScoped for FavoritesReconciler {
    fn scope(&self) -> String {
        "favorites".to_string()
    }

    /// Drop the signed-in user's list and switch the view to the new
    /// regime. The device list is local, so its first page is shown at once.
    fn purge(&self, transition: &AuthTransition) -> EngineResult<usize> {
        let dropped = self.user.purge()?;
        let regime = transition.current.regime();
        let limit = self.config.default_page_limit;
        let view = match regime {
            IdentityRegime::Anonymous => {
                let first = self.device.local_page(1, limit)?;
                FavoritesView {
                    regime,
                    entries: first.items,
                    cursor: first.pagination,
                    loading: false,
                }
            }
            IdentityRegime::Authenticated => FavoritesView::empty(regime, limit),
        };
        let mut state = self.lock()?;
        state.generation += 1;
        state.view = view;
        self.publisher.send_replace(state.view.clone());
        Ok(dropped)
    }
}

fn owner_kind(regime: IdentityRegime) -> OwnerKind {
    match regime {
        IdentityRegime::Anonymous => OwnerKind::Device,
        IdentityRegime::Authenticated => OwnerKind::User,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthIdentity;
    use crate::device::{DeviceIdentityProvider, DeviceRecord, FingerprintSource, MemoryDeviceStore};
    use crate::transition::IdentityTransitionBus;
    use platter_core::{BearerToken, DeviceId, UserId};
    use platter_test_utils::fixtures::{authenticated_identity, favorite_fixture};
    use platter_test_utils::{ApiOp, MockReviewsApi};

    struct Harness {
        api: MockReviewsApi,
        session: Arc<Session>,
        favorites: Arc<FavoritesReconciler>,
        _bus: IdentityTransitionBus,
    }

    fn harness() -> Harness {
        let api = MockReviewsApi::new();
        let store = MemoryDeviceStore::with_record(DeviceRecord {
            id: DeviceId::from("dev-123"),
            created_at: Utc::now(),
        });
        let device = DeviceIdentityProvider::new(Arc::new(store), FingerprintSource::default());
        let auth = Arc::new(AuthIdentity::new());
        let session = Arc::new(Session::new(Arc::clone(&auth), Arc::new(device)));
        let favorites = Arc::new(
            FavoritesReconciler::new(
                Arc::new(DeviceFavorites::in_memory()),
                Arc::new(UserFavorites::new()),
                Arc::new(api.clone()),
                Arc::clone(&session),
                EngineConfig::default(),
            )
            .unwrap(),
        );
        let bus = IdentityTransitionBus::attach(&auth);
        bus.register(favorites.clone()).unwrap();
        Harness {
            api,
            session,
            favorites,
            _bus: bus,
        }
    }

    fn sign_in(h: &Harness, user: &str) {
        h.session
            .auth()
            .set_session(UserId::from(user), BearerToken::new("token"))
            .unwrap();
    }

    #[tokio::test]
    async fn test_toggle_reflects_server_answer() {
        let h = harness();
        let d1 = ResourceId::from("d1");
        let first = h
            .favorites
            .toggle(ResourceKind::Dish, &d1, FavoriteAction::Toggle)
            .await
            .unwrap();
        assert!(first.favorited);
        assert!(h.favorites.is_favorite(ResourceKind::Dish, &d1).unwrap());

        let second = h
            .favorites
            .toggle(ResourceKind::Dish, &d1, FavoriteAction::Toggle)
            .await
            .unwrap();
        assert!(!second.favorited);
        assert!(!h.favorites.is_favorite(ResourceKind::Dish, &d1).unwrap());
    }

    #[tokio::test]
    async fn test_failed_toggle_changes_nothing() {
        let h = harness();
        let d1 = ResourceId::from("d1");
        h.api.fail_next(ApiOp::ToggleFavorite, EngineError::network("offline"));
        let result = h
            .favorites
            .toggle(ResourceKind::Dish, &d1, FavoriteAction::Add)
            .await;
        assert!(result.is_err());
        assert!(!h.favorites.is_favorite(ResourceKind::Dish, &d1).unwrap());
    }

    #[tokio::test]
    async fn test_load_more_after_last_page_makes_no_request() {
        let h = harness();
        sign_in(&h, "u-1");
        h.api.seed_favorites(
            &authenticated_identity("u-1"),
            vec![
                favorite_fixture(ResourceKind::Dish, "d1", OwnerKind::User),
                favorite_fixture(ResourceKind::Dish, "d2", OwnerKind::User),
                favorite_fixture(ResourceKind::Restaurant, "r1", OwnerKind::User),
            ],
        );

        let view = h.favorites.load_favorites(20, 1, false).await.unwrap();
        assert_eq!(view.entries.len(), 3);
        assert!(!view.cursor.has_next);
        assert!(h
            .favorites
            .is_favorite(ResourceKind::Restaurant, &ResourceId::from("r1"))
            .unwrap());

        let calls = h.api.total_calls();
        assert!(h.favorites.load_more().await.unwrap().is_exhausted());
        assert_eq!(h.api.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_pages_append_and_page_one_replaces() {
        let h = harness();
        sign_in(&h, "u-1");
        let entries: Vec<FavoriteEntry> = (0..5)
            .map(|i| favorite_fixture(ResourceKind::Dish, &format!("d{i}"), OwnerKind::User))
            .collect();
        h.api.seed_favorites(&authenticated_identity("u-1"), entries);

        h.favorites.load_favorites(2, 1, false).await.unwrap();
        let more = h.favorites.load_more().await.unwrap();
        let FavoritesLoad::Loaded(view) = more else {
            panic!("expected a second page");
        };
        assert_eq!(view.entries.len(), 4);

        let reloaded = h.favorites.load_favorites(2, 1, true).await.unwrap();
        assert_eq!(reloaded.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_anonymous_list_is_paged_locally() {
        let h = harness();
        for id in ["d1", "d2", "d3"] {
            h.favorites
                .toggle(ResourceKind::Dish, &ResourceId::from(id), FavoriteAction::Add)
                .await
                .unwrap();
        }
        h.api.clear_calls();
        let view = h.favorites.load_favorites(2, 1, false).await.unwrap();
        assert_eq!(view.regime, IdentityRegime::Anonymous);
        assert_eq!(view.entries[0].resource_id.as_str(), "d3");
        assert!(view.cursor.has_next);
        assert_eq!(h.api.call_count(ApiOp::ListFavorites), 0);
    }

    #[tokio::test]
    async fn test_login_switches_authoritative_list_without_merge() {
        let h = harness();
        let d1 = ResourceId::from("d1");
        h.favorites
            .toggle(ResourceKind::Dish, &d1, FavoriteAction::Add)
            .await
            .unwrap();
        h.favorites.load_favorites(20, 1, false).await.unwrap();
        let mut rx = h.favorites.subscribe();

        sign_in(&h, "u-1");
        assert!(rx.has_changed().unwrap());
        let view = rx.borrow_and_update().clone();
        assert_eq!(view.regime, IdentityRegime::Authenticated);
        assert!(view.entries.is_empty());
        assert!(!h.favorites.is_favorite(ResourceKind::Dish, &d1).unwrap());

        h.session.auth().clear_session().unwrap();
        let view = rx.borrow_and_update().clone();
        assert_eq!(view.regime, IdentityRegime::Anonymous);
        assert!(view.contains(ResourceKind::Dish, &d1));
    }

    #[tokio::test]
    async fn test_logout_drops_user_list() {
        let h = harness();
        sign_in(&h, "u-1");
        h.api.seed_favorites(
            &authenticated_identity("u-1"),
            vec![favorite_fixture(ResourceKind::Dish, "d9", OwnerKind::User)],
        );
        h.favorites.load_favorites(20, 1, false).await.unwrap();
        let d9 = ResourceId::from("d9");
        assert!(h.favorites.is_favorite(ResourceKind::Dish, &d9).unwrap());

        h.session.auth().clear_session().unwrap();
        sign_in(&h, "u-2");
        assert!(!h.favorites.is_favorite(ResourceKind::Dish, &d9).unwrap());
        assert!(h.favorites.view().entries.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_toggle_rejected() {
        let h = harness();
        let d1 = ResourceId::from("d1");
        let gate = h.api.gate(ApiOp::ToggleFavorite);
        let first = h.favorites.toggle(ResourceKind::Dish, &d1, FavoriteAction::Toggle);
        let second = async {
            gate.entered().await;
            let rejected = h
                .favorites
                .toggle(ResourceKind::Dish, &d1, FavoriteAction::Toggle)
                .await;
            gate.release();
            rejected
        };
        let (first, second) = tokio::join!(first, second);
        assert!(first.unwrap().favorited);
        assert!(matches!(second, Err(EngineError::OperationInProgress { .. })));
    }

    #[test]
    fn test_device_list_persists() {
        let dir = tempfile::tempdir().unwrap();
        let d1 = ResourceId::from("d1");
        {
            let list = DeviceFavorites::in_dir(dir.path());
            list.confirm(ResourceKind::Dish, &d1, true, Utc::now()).unwrap();
        }
        let reopened = DeviceFavorites::in_dir(dir.path());
        assert!(reopened.contains(ResourceKind::Dish, &d1).unwrap());
        reopened.clear().unwrap();
        assert!(DeviceFavorites::in_dir(dir.path()).entries().unwrap().is_empty());
    }
}
