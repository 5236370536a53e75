//! Engine configuration, loadable from YAML

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Tunables for resolution, validation and storage contention.
///
/// Missing fields fall back to their defaults, so a partial file such as
/// `max_resolve_hops: 4` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Merge links followed before the chain is declared corrupt
    pub max_resolve_hops: usize,
    /// Longest accepted tag name, in characters
    pub max_tag_name_len: usize,
    /// Upper bound on ids + names in one submission
    pub max_tags_per_submission: usize,
    /// Lock wait before a write gives up with a retryable error
    pub busy_timeout_ms: u64,
    pub default_top_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_resolve_hops: 8,
            max_tag_name_len: 100,
            max_tags_per_submission: 32,
            busy_timeout_ms: 5_000,
            default_top_limit: 10,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_resolve_hops == 0 {
            return Err(ConfigError::Invalid("max_resolve_hops must be at least 1".into()));
        }
        if self.max_tag_name_len == 0 {
            return Err(ConfigError::Invalid("max_tag_name_len must be at least 1".into()));
        }
        if self.max_tags_per_submission == 0 {
            return Err(ConfigError::Invalid(
                "max_tags_per_submission must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str("max_resolve_hops: 4\n").unwrap();
        assert_eq!(config.max_resolve_hops, 4);
        assert_eq!(config.max_tag_name_len, 100);
        assert_eq!(config.busy_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn zero_hops_rejected() {
        let err = EngineConfig::from_yaml_str("max_resolve_hops: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_types_rejected() {
        let err = EngineConfig::from_yaml_str("busy_timeout_ms: soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagtally.yaml");
        std::fs::write(&path, "max_tags_per_submission: 5\ndefault_top_limit: 3\n").unwrap();

        let config = EngineConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.max_tags_per_submission, 5);
        assert_eq!(config.default_top_limit, 3);
    }
}
