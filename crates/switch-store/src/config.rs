//! Store configuration.
//!
//! Loaded from a TOML file, every field defaulted:
//!
//! ```toml
//! [schema]
//! path = "/usr/share/switch/schema.json"
//!
//! [warm_boot]
//! enabled = false
//! dump_path = "/var/warmboot/switch/store.dump"
//!
//! [logging]
//! level = "debug"
//!
//! [iteration]
//! batch_size = 256
//! ```

use crate::error::{StoreError, StoreResult};
use crate::lock::DEFAULT_SCAN_BATCH;
use log::{info, LevelFilter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Schema location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_schema_path")]
    pub path: PathBuf,
}

/// Warm boot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmBootConfig {
    /// Replay the dump at init instead of starting empty
    #[serde(default)]
    pub enabled: bool,

    /// Where `object_info_dump` writes and replay reads
    #[serde(default = "default_dump_path")]
    pub dump_path: PathBuf,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Overrides the process log level when set (`error`..`trace`, `off`)
    #[serde(default)]
    pub level: Option<String>,
}

/// Bulk scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationConfig {
    /// Handles fetched per batch by `SwitchStore::object_scan`
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Complete store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub warm_boot: WarmBootConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub iteration: IterationConfig,
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("/usr/share/switch/schema.json")
}

fn default_dump_path() -> PathBuf {
    PathBuf::from("/var/warmboot/switch/store.dump")
}

fn default_batch_size() -> usize {
    DEFAULT_SCAN_BATCH
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: default_schema_path(),
        }
    }
}

impl Default for WarmBootConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dump_path: default_dump_path(),
        }
    }
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from file, falling back to defaults if the file
    /// does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content).map_err(|e| {
                StoreError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StoreError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Parsed log level override, if any
    pub fn log_level(&self) -> StoreResult<Option<LevelFilter>> {
        self.logging
            .level
            .as_deref()
            .map(|s| {
                LevelFilter::from_str(s)
                    .map_err(|_| StoreError::Config(format!("invalid log level '{}'", s)))
            })
            .transpose()
    }

    /// Validate configuration
    pub fn validate(&self) -> StoreResult<()> {
        if self.schema.path.as_os_str().is_empty() {
            return Err(StoreError::Config("schema.path must be set".to_string()));
        }

        if self.warm_boot.enabled && self.warm_boot.dump_path.as_os_str().is_empty() {
            return Err(StoreError::Config(
                "warm_boot.dump_path must be set when warm boot is enabled".to_string(),
            ));
        }

        if self.iteration.batch_size == 0 {
            return Err(StoreError::Config(
                "iteration.batch_size must be > 0".to_string(),
            ));
        }

        self.log_level()?;
        Ok(())
    }
}
