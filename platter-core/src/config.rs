//! Engine policy configuration.

use crate::error::ConfigError;
use std::time::Duration;

/// Policy knobs for the cache and mutation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Timeout for collection and stats reads.
    pub read_timeout: Duration,
    /// Timeout for rating/comment create, update and delete.
    pub write_timeout: Duration,
    /// Timeout for favorite toggles and favorite list loads.
    pub favorite_timeout: Duration,
    /// How long aggregate stats stay fresh.
    pub stats_ttl: Duration,
    /// Maximum number of locally-made ratings kept on the device.
    pub local_ratings_cap: usize,
    /// Page size used when a caller does not specify one.
    pub default_page_limit: u32,
    /// Minimum comment length after trimming.
    pub comment_min_chars: usize,
    /// Maximum comment length after trimming.
    pub comment_max_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(8),
            write_timeout: Duration::from_secs(10),
            favorite_timeout: Duration::from_secs(12),
            stats_ttl: Duration::from_secs(5 * 60),
            local_ratings_cap: 100,
            default_page_limit: 10,
            comment_min_chars: 3,
            comment_max_chars: 500,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_favorite_timeout(mut self, timeout: Duration) -> Self {
        self.favorite_timeout = timeout;
        self
    }

    pub fn with_stats_ttl(mut self, ttl: Duration) -> Self {
        self.stats_ttl = ttl;
        self
    }

    pub fn with_local_ratings_cap(mut self, cap: usize) -> Self {
        self.local_ratings_cap = cap;
        self
    }

    pub fn with_default_page_limit(mut self, limit: u32) -> Self {
        self.default_page_limit = limit;
        self
    }

    pub fn with_comment_bounds(mut self, min: usize, max: usize) -> Self {
        self.comment_min_chars = min;
        self.comment_max_chars = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
            ("favorite_timeout", self.favorite_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be > 0".to_string(),
                });
            }
        }
        if self.local_ratings_cap == 0 {
            return Err(ConfigError::InvalidValue {
                field: "local_ratings_cap",
                reason: "must be > 0".to_string(),
            });
        }
        if self.default_page_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_page_limit",
                reason: "must be > 0".to_string(),
            });
        }
        if self.comment_max_chars < self.comment_min_chars {
            return Err(ConfigError::InvalidValue {
                field: "comment_max_chars",
                reason: "must be >= comment_min_chars".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stats_ttl, Duration::from_secs(300));
        assert_eq!(config.local_ratings_cap, 100);
    }

    #[test]
    fn test_builder_and_rejections() {
        let config = EngineConfig::new()
            .with_read_timeout(Duration::from_secs(2))
            .with_comment_bounds(10, 5);
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert!(config.validate().is_err());

        let zero = EngineConfig::new().with_write_timeout(Duration::ZERO);
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::InvalidValue { field: "write_timeout", .. })
        ));
    }
}
