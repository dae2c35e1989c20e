//! Engine configuration
//!
//! Loaded once at startup from TOML. Every section has defaults so a config
//! file only needs to name the values it overrides:
//!
//! ```toml
//! [store]
//! unload_delay_ticks = 40
//!
//! [streaming]
//! radius = 6
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{store, streaming};

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub streaming: StreamingConfig,
    pub workers: WorkerConfig,
    pub storage: StorageConfig,
}

/// Region store tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of stripe locks guarding lookup-or-create sequences
    pub stripe_count: usize,
    /// Ticks an unanchored region survives before it is unloaded
    pub unload_delay_ticks: u32,
    /// Minimum world-age ticks between autosaves of one region
    pub autosave_interval_ticks: u64,
    /// Upper bound on `wait_until_done` during shutdown
    #[serde(with = "duration_millis", rename = "shutdown_timeout_ms")]
    pub shutdown_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stripe_count: store::DEFAULT_STRIPE_COUNT,
            unload_delay_ticks: store::DEFAULT_UNLOAD_DELAY_TICKS,
            autosave_interval_ticks: store::DEFAULT_AUTOSAVE_INTERVAL_TICKS,
            shutdown_timeout: store::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Streaming window configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Window radius in regions; the window spans `2 * radius + 1` regions per axis
    pub radius: i32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            radius: streaming::DEFAULT_WINDOW_RADIUS,
        }
    }
}

/// Background worker counts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub loader_threads: usize,
    pub generator_threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            loader_threads: 2,
            generator_threads: num_cpus::get().saturating_sub(1).clamp(1, 8),
        }
    }
}

/// Region file storage
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub save_dir: PathBuf,
    /// zlib level 0-9; 0 stores uncompressed
    pub compression_level: u32,
    pub world_seed: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("saves/world/regions"),
            compression_level: 6,
            world_seed: 12345,
        }
    }
}

impl EngineConfig {
    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.stripe_count == 0 {
            return Err(ConfigError::Invalid {
                field: "store.stripe_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.streaming.radius < 0 || self.streaming.radius > streaming::MAX_WINDOW_RADIUS {
            return Err(ConfigError::Invalid {
                field: "streaming.radius",
                reason: format!("must be within 0..={}", streaming::MAX_WINDOW_RADIUS),
            });
        }
        if self.workers.loader_threads == 0 || self.workers.generator_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "thread counts must be non-zero".to_string(),
            });
        }
        if self.storage.compression_level > 9 {
            return Err(ConfigError::Invalid {
                field: "storage.compression_level",
                reason: format!("{} is outside 0..=9", self.storage.compression_level),
            });
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.store.stripe_count, store::DEFAULT_STRIPE_COUNT);
        assert_eq!(config.streaming.radius, streaming::DEFAULT_WINDOW_RADIUS);
        assert_eq!(config.store.shutdown_timeout, store::DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            [store]
            unload_delay_ticks = 40
            shutdown_timeout_ms = 250

            [streaming]
            radius = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.store.unload_delay_ticks, 40);
        assert_eq!(config.store.shutdown_timeout, Duration::from_millis(250));
        assert_eq!(config.streaming.radius, 6);
        // Untouched values keep their defaults
        assert_eq!(config.store.autosave_interval_ticks, store::DEFAULT_AUTOSAVE_INTERVAL_TICKS);
    }

    #[test]
    fn test_rejects_zero_stripes() {
        let err = EngineConfig::from_toml_str("[store]\nstripe_count = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "store.stripe_count", .. }));
    }

    #[test]
    fn test_rejects_bad_compression_level() {
        let err = EngineConfig::from_toml_str("[storage]\ncompression_level = 12").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = EngineConfig::from_toml_str("[store\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
