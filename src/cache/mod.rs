//! Cache layer
//!
//! Provides the caching abstraction used by the HTTP response cache:
//! - In-memory cache (moka) with a TTL per entry
//! - A disabled cache that stores nothing, selected by `cache.enabled = false`
//!
//! # Usage
//!
//! ```rust,ignore
//! use blango::cache::{create_cache, CacheLayer};
//! use blango::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default())?;
//! cache.set("key", &"value", Duration::from_secs(60)).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

/// Prefix of every cached HTTP response key
pub const RESPONSE_KEY_PREFIX: &str = "response:";

/// Cache layer trait
///
/// The methods are generic, so this trait is not object safe. Use the
/// `Cache` enum for runtime polymorphism.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values matching a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

pub use memory::MemoryCache;

/// Unified cache enum for runtime polymorphism
#[derive(Debug)]
pub enum Cache {
    /// In-memory cache using moka
    Memory(MemoryCache),
    /// Caching switched off; reads always miss
    Disabled,
}

impl Cache {
    /// Whether values are actually stored
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Cache::Disabled)
    }
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            Cache::Disabled => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_pattern(pattern).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
            Cache::Disabled => Ok(()),
        }
    }
}

/// Create a cache instance based on configuration
///
/// # Errors
/// Returns an error if the cache is enabled with a zero capacity.
pub fn create_cache(config: &CacheConfig) -> Result<Arc<Cache>> {
    if !config.enabled {
        tracing::info!("Response cache disabled");
        return Ok(Arc::new(Cache::Disabled));
    }

    if config.max_capacity == 0 {
        anyhow::bail!("cache.max_capacity must be greater than 0 when the cache is enabled");
    }

    let ttl = Duration::from_secs(config.ttl_seconds);
    let cache = MemoryCache::with_capacity_and_ttl(config.max_capacity, ttl);
    tracing::info!(
        max_capacity = config.max_capacity,
        ttl_seconds = config.ttl_seconds,
        "Using in-memory response cache"
    );
    Ok(Arc::new(Cache::Memory(cache)))
}

/// Build the cache key of an HTTP response
///
/// The key holds the method and full URI in clear text, followed by a SHA-256
/// digest of the identity headers so that two callers never share an entry.
pub fn response_key(method: &str, uri: &str, authorization: Option<&str>, cookie: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(authorization.unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    hasher.update(cookie.unwrap_or_default().as_bytes());
    let digest = hasher.finalize();

    let identity: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{} {}#{}", RESPONSE_KEY_PREFIX, method, uri, identity)
}

/// Drop every cached post and tag response
pub async fn invalidate_content(cache: &Cache) -> Result<()> {
    cache
        .delete_pattern(&format!("{}*/posts/*", RESPONSE_KEY_PREFIX))
        .await?;
    cache
        .delete_pattern(&format!("{}*/tags/*", RESPONSE_KEY_PREFIX))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let config = CacheConfig::default();
        let cache = create_cache(&config).unwrap();
        assert!(cache.is_enabled());

        cache
            .set("test_key", &"test_value".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(result, Some("test_value".to_string()));
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let cache = create_cache(&config).unwrap();
        assert!(!cache.is_enabled());

        cache.set("k", &1u32, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get::<u32>("k").await.unwrap(), None);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CacheConfig {
            max_capacity: 0,
            ..CacheConfig::default()
        };
        assert!(create_cache(&config).is_err());
    }

    #[test]
    fn test_response_key_depends_on_identity() {
        let anonymous = response_key("GET", "/api/v1/posts/", None, None);
        let alice = response_key("GET", "/api/v1/posts/", Some("Token aaa"), None);
        let bob = response_key("GET", "/api/v1/posts/", Some("Token bbb"), None);
        let cookie = response_key("GET", "/api/v1/posts/", None, Some("Token aaa"));

        assert!(anonymous.starts_with("response:GET /api/v1/posts/#"));
        assert_ne!(anonymous, alice);
        assert_ne!(alice, bob);
        assert_ne!(alice, cookie);
        assert_eq!(alice, response_key("GET", "/api/v1/posts/", Some("Token aaa"), None));
    }

    #[tokio::test]
    async fn test_invalidate_content_keeps_user_entries() {
        let cache = create_cache(&CacheConfig::default()).unwrap();
        let ttl = Duration::from_secs(60);
        let posts = response_key("GET", "/api/v1/posts/?page=2", None, None);
        let tag_posts = response_key("GET", "/api/v1/tags/1/posts/", None, None);
        let tags = response_key("GET", "/api/v1/tags/", None, None);
        let user = response_key("GET", "/api/v1/users/a@example.com", None, None);

        for key in [&posts, &tag_posts, &tags, &user] {
            cache.set(key, &"body".to_string(), ttl).await.unwrap();
        }

        invalidate_content(&cache).await.unwrap();

        assert_eq!(cache.get::<String>(&posts).await.unwrap(), None);
        assert_eq!(cache.get::<String>(&tag_posts).await.unwrap(), None);
        assert_eq!(cache.get::<String>(&tags).await.unwrap(), None);
        assert_eq!(
            cache.get::<String>(&user).await.unwrap(),
            Some("body".to_string())
        );
    }
}
