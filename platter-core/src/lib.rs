//! Platter Core - Review Engine Types
//!
//! Data types, the identity model, the error taxonomy and the remote API
//! seam shared by every other Platter crate. Nothing in here performs I/O.

pub mod api;
pub mod config;
pub mod entities;
pub mod error;
pub mod identity;
pub mod listeners;
pub mod validation;

pub use api::{ReviewItem, ReviewsApi};
pub use config::EngineConfig;
pub use entities::{
    AggregateStats, CachedItem, Collection, Comment, CommentDraft, CommentPatch,
    FavoriteAction, FavoriteEntry, FavoriteToggle, OwnerKind, Page, PaginationCursor, Rating,
    RatingDraft, RatingPatch, ResourceId, ResourceKind,
};
pub use error::{ConfigError, EngineError, EngineResult, StorageError, ValidationError};
pub use identity::{
    AuthSnapshot, BearerToken, DeviceId, Identity, IdentityRegime, Timestamp, UserId,
};
pub use listeners::{Listeners, Subscription};
pub use validation::Validate;
