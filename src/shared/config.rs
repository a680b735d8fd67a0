/// Engine configuration
///
/// Loaded from a JSON file by the CLI (any missing field takes its default)
/// and handed to every service at construction.
///
/// ```json
/// {
///   "max_search_depth": 16,
///   "store_timeout_ms": 2000,
///   "default_subtree_depth": 4,
///   "max_occupy_retries": 8
/// }
/// ```

use crate::domain::MAX_LEVEL;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How many levels below the sponsor the open-slot search may widen
    pub max_search_depth: u32,

    /// Deadline applied to every individual store call
    pub store_timeout_ms: u64,

    /// Levels returned by a subtree query when the caller gives no depth
    pub default_subtree_depth: u32,

    /// Automatic placements retried after losing an occupy race
    pub max_occupy_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_search_depth: 16,
            store_timeout_ms: 2_000,
            default_subtree_depth: 4,
            max_occupy_retries: 8,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_search_depth == 0 || self.max_search_depth > MAX_LEVEL {
            return Err(ConfigError::Invalid(format!(
                "max_search_depth must be in 1..={}, got {}",
                MAX_LEVEL, self.max_search_depth
            )));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.default_subtree_depth > MAX_LEVEL {
            return Err(ConfigError::Invalid(format!(
                "default_subtree_depth must be at most {}",
                MAX_LEVEL
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_search_depth": 5}"#).unwrap();
        assert_eq!(config.max_search_depth, 5);
        assert_eq!(config.default_subtree_depth, 4);
        assert_eq!(config.max_occupy_retries, 8);
    }

    #[test]
    fn test_rejects_out_of_range_depth() {
        let config = EngineConfig {
            max_search_depth: MAX_LEVEL + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig {
            store_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = EngineConfig::from_json_file("/nonexistent/placement.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
