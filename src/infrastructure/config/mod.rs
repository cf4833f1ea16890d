//! Cache configuration.

pub mod cache_config;

pub use cache_config::{
    CacheConfig, ConfigError, DEFAULT_MEMORY_CAPACITY, KeyScheme, LogLevel,
};
