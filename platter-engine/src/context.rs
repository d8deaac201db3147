//! The engine's object graph, built once at startup.
//!
//! Everything the facade needs is constructed here and passed by reference;
//! there is no process-wide state. Building a context wires every
//! identity-scoped cache into the [`IdentityTransitionBus`].

use platter_cache::{ResourceCache, StatsCache};
use platter_client::{ClientConfig, RestClient};
use platter_core::{
    Comment, EngineConfig, EngineError, EngineResult, Rating, ResourceKind, ReviewItem,
    ReviewsApi,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::AuthIdentity;
use crate::device::{DeviceIdentityProvider, DeviceStore, FileDeviceStore, FingerprintSource, MemoryDeviceStore};
use crate::favorites::{DeviceFavorites, FavoritesReconciler, UserFavorites};
use crate::local_ratings::LocalRatings;
use crate::mutation::OptimisticMutationCoordinator;
use crate::session::Session;
use crate::transition::IdentityTransitionBus;

/// One value per resource kind.
pub struct ByKind<C> {
    pub dish: C,
    pub restaurant: C,
}

impl<C> ByKind<C> {
    pub fn build(mut make: impl FnMut(ResourceKind) -> C) -> Self {
        Self {
            dish: make(ResourceKind::Dish),
            restaurant: make(ResourceKind::Restaurant),
        }
    }

    pub fn get(&self, kind: ResourceKind) -> &C {
        match kind {
            ResourceKind::Dish => &self.dish,
            ResourceKind::Restaurant => &self.restaurant,
        }
    }
}

pub struct EngineContext {
    config: EngineConfig,
    api: Arc<dyn ReviewsApi>,
    session: Arc<Session>,
    ratings: ByKind<OptimisticMutationCoordinator<Rating>>,
    comments: ByKind<OptimisticMutationCoordinator<Comment>>,
    stats: StatsCache,
    favorites: Arc<FavoritesReconciler>,
    local_ratings: Arc<LocalRatings>,
    bus: IdentityTransitionBus,
}

impl EngineContext {
    pub fn builder(api: Arc<dyn ReviewsApi>) -> EngineContextBuilder {
        EngineContextBuilder::new(api)
    }

    /// Production wiring: REST client, state files under `state_dir`.
    pub fn from_client_config(config: &ClientConfig, auth: Arc<AuthIdentity>) -> EngineResult<Self> {
        let client = RestClient::new(config)
            .map_err(|e| e.into_engine(false, "build client", Duration::ZERO))?;
        Self::builder(Arc::new(client))
            .config(config.engine_config())
            .auth(auth)
            .state_dir(config.state_dir.clone())
            .build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn api(&self) -> &dyn ReviewsApi {
        self.api.as_ref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn auth(&self) -> &Arc<AuthIdentity> {
        self.session.auth()
    }

    pub fn ratings(&self, kind: ResourceKind) -> &OptimisticMutationCoordinator<Rating> {
        self.ratings.get(kind)
    }

    pub fn comments(&self, kind: ResourceKind) -> &OptimisticMutationCoordinator<Comment> {
        self.comments.get(kind)
    }

    pub fn stats(&self) -> &StatsCache {
        &self.stats
    }

    pub fn favorites(&self) -> &FavoritesReconciler {
        &self.favorites
    }

    pub fn local_ratings(&self) -> &LocalRatings {
        &self.local_ratings
    }

    pub fn bus(&self) -> &IdentityTransitionBus {
        &self.bus
    }
}

/// Builder for [`EngineContext`]. Defaults keep everything in memory.
pub struct EngineContextBuilder {
    api: Arc<dyn ReviewsApi>,
    config: EngineConfig,
    auth: Option<Arc<AuthIdentity>>,
    device_store: Option<Arc<dyn DeviceStore>>,
    fingerprint: FingerprintSource,
    state_dir: Option<PathBuf>,
}

impl EngineContextBuilder {
    fn new(api: Arc<dyn ReviewsApi>) -> Self {
        Self {
            api,
            config: EngineConfig::default(),
            auth: None,
            device_store: None,
            fingerprint: FingerprintSource::default(),
            state_dir: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn auth(mut self, auth: Arc<AuthIdentity>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn device_store(mut self, store: Arc<dyn DeviceStore>) -> Self {
        self.device_store = Some(store);
        self
    }

    pub fn fingerprint(mut self, source: FingerprintSource) -> Self {
        self.fingerprint = source;
        self
    }

    /// Persist the device id, local ratings and device favorites here.
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> EngineResult<EngineContext> {
        self.config.validate().map_err(EngineError::from)?;
        let config = self.config;
        let auth = self.auth.unwrap_or_default();

        let device_store: Arc<dyn DeviceStore> = match (&self.device_store, &self.state_dir) {
            (Some(store), _) => Arc::clone(store),
            (None, Some(dir)) => Arc::new(FileDeviceStore::in_dir(dir)),
            (None, None) => Arc::new(MemoryDeviceStore::new()),
        };
        let (local_ratings, device_favorites) = match &self.state_dir {
            Some(dir) => (
                LocalRatings::in_dir(dir, config.local_ratings_cap),
                DeviceFavorites::in_dir(dir),
            ),
            None => (
                LocalRatings::in_memory(config.local_ratings_cap),
                DeviceFavorites::in_memory(),
            ),
        };

        let device = Arc::new(DeviceIdentityProvider::new(device_store, self.fingerprint));
        let session = Arc::new(Session::new(Arc::clone(&auth), device));
        let stats = StatsCache::new(config.stats_ttl);
        let api = self.api;

        let ratings = ByKind::build(|kind| coordinator::<Rating>(kind, &stats, &api, &session, &config));
        let comments = ByKind::build(|kind| coordinator::<Comment>(kind, &stats, &api, &session, &config));
        let favorites = Arc::new(FavoritesReconciler::new(
            Arc::new(device_favorites),
            Arc::new(UserFavorites::new()),
            Arc::clone(&api),
            Arc::clone(&session),
            config.clone(),
        )?);

        let bus = IdentityTransitionBus::attach(&auth);
        for kind in ResourceKind::ALL {
            bus.register(Arc::new(ratings.get(kind).cache().clone()))?;
            bus.register(Arc::new(comments.get(kind).cache().clone()))?;
        }
        bus.register(favorites.clone())?;

        info!(
            targets = bus.target_count(),
            persistent = self.state_dir.is_some(),
            "engine context ready"
        );
        Ok(EngineContext {
            config,
            api,
            session,
            ratings,
            comments,
            stats,
            favorites,
            local_ratings: Arc::new(local_ratings),
            bus,
        })
    }
}

fn coordinator<T: ReviewItem>(
    kind: ResourceKind,
    stats: &StatsCache,
    api: &Arc<dyn ReviewsApi>,
    session: &Arc<Session>,
    config: &EngineConfig,
) -> OptimisticMutationCoordinator<T> {
    OptimisticMutationCoordinator::new(
        kind,
        ResourceCache::new(kind, config.default_page_limit),
        stats.clone(),
        Arc::clone(api),
        Arc::clone(session),
        config.clone(),
    )
}
