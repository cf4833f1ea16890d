//! Cache configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::ports::KeyCodec;
use crate::infrastructure::image::key_codec::{HashCodeCodec, Sha256Codec};

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";
const APP_NAME: &str = "webimage-cache";

/// Memory tier capacity used when none (or zero) is configured: 50 MiB.
pub const DEFAULT_MEMORY_CAPACITY: usize = 50 * 1024 * 1024;

/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 50_000;

/// Default read timeout in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500_000;

/// Default upper bound on concurrently running fetches.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

/// Default allocation limit for a single decode: 512 MiB.
pub const DEFAULT_MAX_DECODE_BYTES: u64 = 512 * 1024 * 1024;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform cache directory could be determined.
    #[error("failed to determine cache directory")]
    ConfigDirNotFound,
    /// Reading the configuration file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration text is not valid TOML for [`CacheConfig`].
    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// How disk cache file names are derived from locators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// 32-bit string hash rendered as signed decimal.
    #[default]
    HashCode,
    /// Truncated SHA-256, hex encoded.
    Sha256,
}

impl KeyScheme {
    /// Builds the codec for this scheme.
    #[must_use]
    pub fn codec(self) -> Arc<dyn KeyCodec> {
        match self {
            Self::HashCode => Arc::new(HashCodeCodec),
            Self::Sha256 => Arc::new(Sha256Codec),
        }
    }
}

/// Settings for an [`ImageCache`](crate::infrastructure::image::ImageCache).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory of the disk tier. `None` disables it.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Memory tier capacity in bytes. Zero selects [`DEFAULT_MEMORY_CAPACITY`].
    #[serde(default)]
    pub memory_capacity_bytes: usize,

    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Response read timeout in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Upper bound on fetch bodies running at once.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Allocation limit for decoding a single image.
    #[serde(default = "default_max_decode_bytes")]
    pub max_decode_bytes: u64,

    /// How disk file names are derived.
    #[serde(default)]
    pub key_scheme: KeyScheme,

    /// User-Agent header sent with downloads.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Log verbosity for [`init_logging`](crate::telemetry::init_logging).
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            memory_capacity_bytes: 0,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            max_decode_bytes: DEFAULT_MAX_DECODE_BYTES,
            key_scheme: KeyScheme::default(),
            user_agent: default_user_agent(),
            log_level: LogLevel::default(),
        }
    }
}

impl CacheConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TomlDe` if the text is not valid configuration.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded cache configuration");
        Ok(config)
    }

    /// Sets the disk tier directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Sets the memory tier capacity in bytes.
    #[must_use]
    pub const fn with_memory_capacity(mut self, bytes: usize) -> Self {
        self.memory_capacity_bytes = bytes;
        self
    }

    /// Uses the platform cache directory for the disk tier.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigDirNotFound` if no home directory is known.
    pub fn with_default_cache_dir(mut self) -> Result<Self, ConfigError> {
        let dir = ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.cache_dir().join("images"))
            .ok_or(ConfigError::ConfigDirNotFound)?;
        self.cache_dir = Some(dir);
        Ok(self)
    }

    /// Returns the memory capacity, substituting the default for zero.
    #[must_use]
    pub const fn effective_memory_capacity(&self) -> usize {
        if self.memory_capacity_bytes == 0 {
            DEFAULT_MEMORY_CAPACITY
        } else {
            self.memory_capacity_bytes
        }
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout as a [`Duration`].
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

const fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

const fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

const fn default_max_concurrent_fetches() -> usize {
    DEFAULT_MAX_CONCURRENT_FETCHES
}

const fn default_max_decode_bytes() -> u64 {
    DEFAULT_MAX_DECODE_BYTES
}

fn default_user_agent() -> String {
    format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION"))
}
