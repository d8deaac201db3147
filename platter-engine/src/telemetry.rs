//! Tracing subscriber initialization.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] read from
//! `PLATTER_LOG` and a JSON or human-readable fmt layer.

use platter_client::{ClientConfig, LogFormat};
use platter_core::{ConfigError, EngineError, EngineResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the filter directives.
pub const LOG_ENV_VAR: &str = "PLATTER_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Directives used when `PLATTER_LOG` is unset or invalid.
    pub default_directives: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_directives: DEFAULT_DIRECTIVES.to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self {
            format: config.log_format,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new(&self.default_directives))
    }
}

/// Install the global subscriber. Call once at startup; a second call
/// returns an error and leaves the first subscriber in place.
pub fn init_tracing(config: &TelemetryConfig) -> EngineResult<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    let installed = match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    installed.map_err(|e| {
        EngineError::Config(ConfigError::InvalidValue {
            field: "tracing",
            reason: format!("Failed to init subscriber: {}", e),
        })
    })?;

    tracing::info!(format = ?config.format, "Telemetry initialized");
    Ok(())
}
