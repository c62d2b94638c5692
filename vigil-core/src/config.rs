//! Configuration for the session cache.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::events::MessageType;

/// Main configuration for the session cache store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Message types whose last instance is cached per session.
    ///
    /// Messages of other types still go through the duplicate filter but are
    /// neither cached nor used to rewind the cache during playback.
    pub cached_types: BTreeSet<MessageType>,
    /// Rate limiting for high-frequency entity updates.
    pub throttle: ThrottleConfig,
}

fn default_cached_types() -> BTreeSet<MessageType> {
    [
        MessageType::LearnerState,
        MessageType::InitializePedagogicalModelRequest,
        MessageType::PedagogicalRequest,
        MessageType::LessonStarted,
        MessageType::LessonCompleted,
        MessageType::KnowledgeSessionUpdate,
    ]
    .into_iter()
    .collect()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cached_types: default_cached_types(),
            throttle: ThrottleConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Parse a config from TOML text. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Load a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Replace the cached type whitelist.
    #[must_use]
    pub fn with_cached_types(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.cached_types = types.into_iter().collect();
        self
    }

    /// Set the minimum interval between forwarded entity updates.
    #[must_use]
    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle.min_interval = interval;
        self
    }
}

/// Configuration for the [`ThrottleGate`](crate::ThrottleGate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Updates for the same entity closer together than this are dropped.
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(250),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_default_values() {
        let config = CacheConfig::default();
        let types = &config.cached_types;

        assert!(types.contains(&MessageType::LearnerState));
        assert!(types.contains(&MessageType::LessonStarted));
        assert!(!types.contains(&MessageType::EntityState));
        assert_eq!(config.throttle.min_interval, Duration::from_millis(250));
    }

    #[test]
    fn config_builder_pattern() {
        let config = CacheConfig::default()
            .with_cached_types([MessageType::LearnerState])
            .with_throttle_interval(Duration::from_millis(100));

        assert_eq!(config.cached_types.len(), 1);
        assert_eq!(config.throttle.min_interval, Duration::from_millis(100));
    }

    #[test]
    fn config_parses_partial_toml() {
        let config = CacheConfig::from_toml_str(
            r#"
            [throttle]
            min_interval = "1s"
            "#,
        )
        .unwrap();

        assert_eq!(config.throttle.min_interval, Duration::from_secs(1));
        assert_eq!(config.cached_types, default_cached_types());
    }

    #[test]
    fn config_parses_type_list() {
        let text = r#"cached_types = ["learner_state", "entity_state"]"#;
        let config = CacheConfig::from_toml_str(text).unwrap();

        assert!(config.cached_types.contains(&MessageType::EntityState));
        assert!(!config.cached_types.contains(&MessageType::LessonStarted));
    }

    #[test]
    fn config_rejects_unknown_type() {
        let err = CacheConfig::from_toml_str(r#"cached_types = ["bogus"]"#).unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn config_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[throttle]\nmin_interval = \"500ms\"").unwrap();

        let config = CacheConfig::load(file.path()).unwrap();
        assert_eq!(config.throttle.min_interval, Duration::from_millis(500));
    }

    #[test]
    fn config_load_missing_file_is_config_error() {
        let err = CacheConfig::load("/nonexistent/vigil.toml").unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
        assert!(err.to_string().contains("vigil.toml"));
    }
}
