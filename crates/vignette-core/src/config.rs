//! Configuration management for Vignette.
//!
//! Configuration is loaded from the platform config directory (e.g.
//! `~/.config/vignette/config.toml` on Linux) with sensible defaults.
//! All config structs implement `Default`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Vignette.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Memory cache settings
    pub cache: CacheConfig,

    /// Concurrency gate capacities
    pub gates: GateConfig,

    /// Decode settings
    pub decode: DecodeConfig,

    /// HTTP resolver settings
    pub http: HttpConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories, falling back to
    /// `~/.vignette/config.toml` if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "vignette", "vignette")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".vignette").join("config.toml")
            })
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "cache.max_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Memory cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total pixel-buffer budget of the in-memory cache, in bytes
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 64 MiB of decoded pixels
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Concurrency gate capacities.
///
/// Gates bound how many loader tasks may sit in a CPU/memory-intensive
/// phase at once. Unlisted gate names default to capacity 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Capacity of the general decode/transform gate
    pub decode: usize,

    /// Capacity of the auxiliary codec gate (serializes non-reentrant
    /// codecs such as the WebP decoder)
    pub auxiliary: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            decode: 1,
            auxiliary: 1,
        }
    }
}

impl GateConfig {
    /// Capacity for a gate name; unknown names get the default of 1.
    pub fn capacity_for(&self, name: &str) -> usize {
        let capacity = match name {
            crate::gate::DECODE_GATE => self.decode,
            crate::gate::AUXILIARY_GATE => self.auxiliary,
            _ => 1,
        };
        capacity.max(1)
    }
}

/// Decode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Whether decoding may enlarge images beyond native resolution when
    /// a request does not say otherwise
    pub allow_upscale: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            allow_upscale: false,
        }
    }
}

/// HTTP resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// User-Agent header sent by the built-in network resolver
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("vignette/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Logging settings, read by the CLI when initializing the subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
