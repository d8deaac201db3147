//! Platter Engine - Identity-Aware Reviews and Favorites
//!
//! Ties the caches to the remote API under two mutually exclusive identity
//! regimes: an anonymous device id and a signed-in user.
//!
//! # Components
//!
//! - [`DeviceIdentityProvider`]: persisted anonymous device id
//! - [`AuthIdentity`]: observer over the external auth session
//! - [`OptimisticMutationCoordinator`]: gated create/update/delete
//! - [`FavoritesReconciler`]: per-regime favorites with a reactive view
//! - [`IdentityTransitionBus`]: purges identity-scoped state on transitions
//! - [`UnifiedFacade`]: the only entry point for UI code
//!
//! # Example
//!
//! ```ignore
//! let config = ClientConfig::load()?;
//! init_tracing(&TelemetryConfig::from_client_config(&config))?;
//! let auth = Arc::new(AuthIdentity::new());
//! let facade = UnifiedFacade::new(EngineContext::from_client_config(&config, auth.clone())?);
//!
//! facade.rate(ResourceKind::Dish, &dish_id, RatingDraft::new(4)).await?;
//! auth.set_session(user_id, token)?; // caches are purged before this returns
//! ```

pub mod auth;
pub mod context;
pub mod device;
pub mod facade;
pub mod favorites;
pub mod fetch;
mod inflight;
pub mod local_ratings;
pub mod mutation;
pub mod persistence;
pub mod session;
pub mod telemetry;
pub mod transition;

pub use auth::{AuthIdentity, AuthTransition};
pub use context::{ByKind, EngineContext, EngineContextBuilder};
pub use device::{
    DeviceIdentity, DeviceIdentityProvider, DeviceRecord, DeviceStore, FileDeviceStore,
    FingerprintSource, MemoryDeviceStore, UnavailableDeviceStore,
};
pub use facade::UnifiedFacade;
pub use favorites::{
    DeviceFavorites, FavoritesLoad, FavoritesReconciler, FavoritesStrategy, FavoritesView,
    UserFavorites,
};
pub use fetch::{timed, ApiCollectionFetcher, ApiStatsFetcher};
pub use local_ratings::{LocalRating, LocalRatings};
pub use mutation::OptimisticMutationCoordinator;
pub use session::{Session, SessionIdentity};
pub use telemetry::{init_tracing, TelemetryConfig, LOG_ENV_VAR};
pub use transition::{IdentityScoped, IdentityTransitionBus};
