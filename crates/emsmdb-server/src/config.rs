//! Server configuration.
//!
//! Settings can be built in code or loaded from a TOML file:
//!
//! ```toml
//! max_handles = 512
//! max_blob_size = 32768
//! strict_save = true
//!
//! [logging]
//! level = "debug"
//! format = "compact"
//! ```

use std::path::Path;

use emsmdb_core::TracingConfig;
use emsmdb_protocol::MAX_PROPERTY_BLOB;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum number of live handles per session.
    pub max_handles: usize,

    /// Maximum size of one encoded property blob.
    pub max_blob_size: usize,

    /// Refuse to save messages that were not opened for writing.
    pub strict_save: bool,

    /// Logging settings.
    pub logging: LoggingSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_handles: 1024,
            max_blob_size: MAX_PROPERTY_BLOB,
            strict_save: true,
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is not set.
    pub level: String,

    /// Output format: `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the handle limit.
    pub fn with_max_handles(mut self, max: usize) -> Self {
        self.max_handles = max;
        self
    }

    /// Builder: set the property blob limit.
    pub fn with_max_blob_size(mut self, max: usize) -> Self {
        self.max_blob_size = max;
        self
    }

    /// Builder: set the read-write check on save.
    pub fn with_strict_save(mut self, strict: bool) -> Self {
        self.strict_save = strict;
        self
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: impl AsRef<Path>) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Checks the limits are usable.
    pub fn validate(&self) -> ServerResult<()> {
        if self.max_handles == 0 {
            return Err(ServerError::config("max_handles must be at least 1"));
        }
        if self.max_blob_size > MAX_PROPERTY_BLOB {
            return Err(ServerError::config(format!(
                "max_blob_size {} exceeds the reply limit of {}",
                self.max_blob_size, MAX_PROPERTY_BLOB
            )));
        }
        Ok(())
    }

    /// Converts the logging settings into a tracing configuration.
    pub fn tracing_config(&self) -> ServerResult<TracingConfig> {
        Ok(TracingConfig::from_names(&self.logging.level, &self.logging.format)?)
    }
}
