//! Store factory for runtime backend selection

use std::sync::Arc;

use serde::Deserialize;

use crate::domain::store::SplitStore;
use crate::domain::DomainError;

use super::in_memory::InMemoryStore;
use super::redis::{RedisStore, RedisStoreConfig};

/// Supported backing store types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// In-memory store (for testing/development)
    InMemory,
    /// Redis store
    Redis,
}

impl StoreType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }
}

/// Backing store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend name (`memory` or `redis`)
    pub backend: String,
    /// Redis connection URL
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: Option<String>,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: Some("split".to_string()),
            connection_timeout_secs: 5,
        }
    }
}

impl StoreConfig {
    /// Creates an in-memory store configuration
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates a Redis configuration from a URL
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: "redis".to_string(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Returns the store type
    pub fn store_type(&self) -> Result<StoreType, DomainError> {
        StoreType::parse(&self.backend).ok_or_else(|| {
            DomainError::configuration(format!("Unknown store backend '{}'", self.backend))
        })
    }

    fn redis_config(&self) -> RedisStoreConfig {
        let config = RedisStoreConfig::new(&self.url).with_connection_timeout(
            std::time::Duration::from_secs(self.connection_timeout_secs),
        );

        match &self.key_prefix {
            Some(prefix) => config.with_key_prefix(prefix),
            None => config.without_key_prefix(),
        }
    }
}

/// Factory for creating backing store instances
#[derive(Debug)]
pub struct StoreFactory;

impl StoreFactory {
    /// Creates a store based on the configuration
    pub async fn create(config: &StoreConfig) -> Result<Arc<dyn SplitStore>, DomainError> {
        match config.store_type()? {
            StoreType::InMemory => Ok(Arc::new(InMemoryStore::new())),
            StoreType::Redis => Ok(Arc::new(RedisStore::new(config.redis_config()).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_type_parsing() {
        assert_eq!(StoreType::parse("memory"), Some(StoreType::InMemory));
        assert_eq!(StoreType::parse("In-Memory"), Some(StoreType::InMemory));
        assert_eq!(StoreType::parse("REDIS"), Some(StoreType::Redis));
        assert_eq!(StoreType::parse("postgres"), None);
    }

    #[test]
    fn test_unknown_backend_is_a_configuration_error() {
        let config = StoreConfig {
            backend: "etcd".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            config.store_type(),
            Err(DomainError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_in_memory() {
        let store = StoreFactory::create(&StoreConfig::in_memory()).await.unwrap();
        store.set("config_version", "1").await.unwrap();
        assert_eq!(store.get("config_version").await.unwrap(), Some("1".to_string()));
    }
}
