//! Configuration management
//!
//! This module handles loading and parsing configuration for the Blango API.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables prefixed with `BLANGO_` (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// API behaviour (pagination)
    #[serde(default)]
    pub api: ApiConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Absolute base URL used when rendering resource references.
    /// Falls back to the request's Host header when unset.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            public_url: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/blango.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether list/retrieve responses are cached at all
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Maximum number of cached responses
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// TTL for post list responses in seconds
    #[serde(default = "default_post_list_ttl")]
    pub post_list_ttl_seconds: u64,
    /// TTL for every other cached response in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_capacity: default_max_capacity(),
            post_list_ttl_seconds: default_post_list_ttl(),
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_capacity() -> u64 {
    10_000
}

fn default_post_list_ttl() -> u64 {
    120
}

fn default_ttl() -> u64 {
    300
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Number of results per page on list endpoints
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    100
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - BLANGO_SERVER_HOST
    /// - BLANGO_SERVER_PORT
    /// - BLANGO_SERVER_CORS_ORIGIN
    /// - BLANGO_SERVER_PUBLIC_URL
    /// - BLANGO_DATABASE_DRIVER
    /// - BLANGO_DATABASE_URL
    /// - BLANGO_CACHE_ENABLED
    /// - BLANGO_CACHE_MAX_CAPACITY
    /// - BLANGO_API_PAGE_SIZE
    pub fn load_with_env(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.api.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "api.page_size must be greater than 0".to_string(),
            ));
        }
        if self.cache.ttl_seconds == 0 || self.cache.post_list_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "cache TTLs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("BLANGO_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("BLANGO_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("BLANGO_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(public_url) = std::env::var("BLANGO_SERVER_PUBLIC_URL") {
            self.server.public_url = Some(public_url);
        }

        if let Ok(driver) = std::env::var("BLANGO_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("BLANGO_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(enabled) = std::env::var("BLANGO_CACHE_ENABLED") {
            if let Ok(enabled) = enabled.parse::<bool>() {
                self.cache.enabled = enabled;
            }
        }
        if let Ok(capacity) = std::env::var("BLANGO_CACHE_MAX_CAPACITY") {
            if let Ok(capacity) = capacity.parse::<u64>() {
                self.cache.max_capacity = capacity;
            }
        }

        if let Ok(page_size) = std::env::var("BLANGO_API_PAGE_SIZE") {
            if let Ok(page_size) = page_size.parse::<u32>() {
                self.api.page_size = page_size;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serializing a config and loading it back preserves every field
        #[test]
        fn config_yaml_roundtrip(
            port in 1u16..=65535,
            page_size in 1u32..=500,
            ttl in 1u64..=86400,
            enabled in prop::bool::ANY,
        ) {
            let mut config = Config::default();
            config.server.port = port;
            config.api.page_size = page_size;
            config.cache.ttl_seconds = ttl;
            config.cache.enabled = enabled;

            let yaml = serde_yaml::to_string(&config).unwrap();
            let loaded: Config = serde_yaml::from_str(&yaml).unwrap();

            prop_assert_eq!(loaded.server.port, port);
            prop_assert_eq!(loaded.api.page_size, page_size);
            prop_assert_eq!(loaded.cache.ttl_seconds, ttl);
            prop_assert_eq!(loaded.cache.enabled, enabled);
        }
    }
}
