//! Configuration loading for Platter clients.
//!
//! All fields are required. No defaults.

use platter_core::{ConfigError, EngineConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "PLATTER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Header carrying the device id on anonymous requests.
    pub device_header: String,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub favorite_timeout_ms: u64,
    /// Directory holding device-local state (device id, local ratings,
    /// anonymous favorites).
    pub state_dir: PathBuf,
    pub stats_ttl_secs: u64,
    pub local_ratings_cap: usize,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl ClientConfig {
    /// Load from `--config <path>` or `PLATTER_CONFIG`, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.device_header.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "device_header",
                reason: "must not be empty".to_string(),
            });
        }
        if reqwest::header::HeaderName::from_bytes(self.device_header.as_bytes()).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "device_header",
                reason: "must be a valid HTTP header name".to_string(),
            });
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "read_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "write_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.favorite_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "favorite_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "state_dir",
                reason: "must not be empty".to_string(),
            });
        }
        if self.local_ratings_cap == 0 {
            return Err(ConfigError::InvalidValue {
                field: "local_ratings_cap",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.api_base_url.trim().trim_end_matches('/')
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn favorite_timeout(&self) -> Duration {
        Duration::from_millis(self.favorite_timeout_ms)
    }

    /// Engine policy derived from this file.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_read_timeout(self.read_timeout())
            .with_write_timeout(self.write_timeout())
            .with_favorite_timeout(self.favorite_timeout())
            .with_stats_ttl(Duration::from_secs(self.stats_ttl_secs))
            .with_local_ratings_cap(self.local_ratings_cap)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
api_base_url = "https://api.example.test/v1/"
device_header = "X-Device-ID"
read_timeout_ms = 8000
write_timeout_ms = 10000
favorite_timeout_ms = 12000
state_dir = "/tmp/platter"
stats_ttl_secs = 300
local_ratings_cap = 100
log_format = "json"
"#;

    #[test]
    fn test_valid_config_parses() {
        let config = ClientConfig::from_toml_str(VALID).unwrap();
        config.validate().unwrap();
        assert_eq!(config.base_url(), "https://api.example.test/v1");
        assert_eq!(config.log_format, LogFormat::Json);

        let engine = config.engine_config();
        assert_eq!(engine.read_timeout, Duration::from_secs(8));
        assert_eq!(engine.favorite_timeout, Duration::from_secs(12));
        assert_eq!(engine.stats_ttl, Duration::from_secs(300));
        assert_eq!(engine.local_ratings_cap, 100);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let text = format!("{VALID}\nretries = 3\n");
        let err = ClientConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_field_rejected() {
        let text = VALID.replace("stats_ttl_secs = 300\n", "");
        assert!(matches!(
            ClientConfig::from_toml_str(&text),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_invalid() {
        let text = VALID.replace("write_timeout_ms = 10000", "write_timeout_ms = 0");
        let config = ClientConfig::from_toml_str(&text).unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "write_timeout_ms"),
            other => panic!("expected invalid write_timeout_ms, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_header_and_url_invalid() {
        let text = VALID.replace("X-Device-ID", "X Device");
        let config = ClientConfig::from_toml_str(&text).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "device_header", .. })
        ));

        let text = VALID.replace("https://api.example.test/v1/", "ftp://nope");
        let config = ClientConfig::from_toml_str(&text).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "api_base_url", .. })
        ));
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platter.toml");
        std::fs::write(&path, VALID).unwrap();
        let config = ClientConfig::from_path(&path).unwrap();
        assert_eq!(config.device_header, "X-Device-ID");

        let missing = ClientConfig::from_path(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
