//! Platter Client - HTTP access to the review API
//!
//! [`RestClient`] implements [`platter_core::ReviewsApi`] over reqwest.
//! Anonymous calls carry the device id in the configured header,
//! authenticated calls a bearer token. Non-success statuses are translated
//! into [`platter_core::EngineError`] kinds at this boundary.

pub mod config;
pub mod error;
pub mod rest;
pub mod wire;

pub use config::{ClientConfig, LogFormat, CONFIG_ENV_VAR};
pub use error::{status_to_engine_error, ApiClientError};
pub use rest::{RequestClass, RestClient};
