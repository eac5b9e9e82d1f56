//! Redis backing store implementation

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::domain::store::SplitStore;
use crate::domain::DomainError;

/// Configuration for the Redis store
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: Option<String>,
    /// Connection timeout
    pub connection_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: Some("split".to_string()),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisStoreConfig {
    /// Creates a new configuration with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Disables key prefixing
    pub fn without_key_prefix(mut self) -> Self {
        self.key_prefix = None;
        self
    }

    /// Sets the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// Redis store implementation
///
/// Counters map to INCRBY/HINCRBY, so concurrent workers never lose updates.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisStore {
    /// Creates a new Redis store connection
    pub async fn new(config: RedisStoreConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| DomainError::store(format!("Failed to create Redis client: {}", e)))?;

        let connection = tokio::time::timeout(
            config.connection_timeout,
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| DomainError::store(format!("Timed out connecting to Redis at {}", config.url)))?
        .map_err(|e| DomainError::store(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { connection, config })
    }

    /// Creates a Redis store with default configuration
    pub async fn with_url(url: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(RedisStoreConfig::new(url)).await
    }

    fn prefix_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl SplitStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError> {
        let mut conn = self.connection.clone();

        conn.get(self.prefix_key(key))
            .await
            .map_err(|e| DomainError::store(format!("Failed to get key '{}': {}", key, e)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DomainError> {
        let mut conn = self.connection.clone();

        let _: () = conn
            .set(self.prefix_key(key), value)
            .await
            .map_err(|e| DomainError::store(format!("Failed to set key '{}': {}", key, e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let deleted: i64 = conn.del(self.prefix_key(key)).await.map_err(|e| {
            DomainError::store(format!("Failed to delete key '{}': {}", key, e))
        })?;

        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        conn.exists(self.prefix_key(key)).await.map_err(|e| {
            DomainError::store(format!("Failed to check existence of key '{}': {}", key, e))
        })
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, DomainError> {
        let mut conn = self.connection.clone();

        conn.incr(self.prefix_key(key), delta).await.map_err(|e| {
            DomainError::store(format!("Failed to increment key '{}': {}", key, e))
        })
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let added: i64 = conn.sadd(self.prefix_key(key), member).await.map_err(|e| {
            DomainError::store(format!("Failed to add to set '{}': {}", key, e))
        })?;

        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let removed: i64 = conn.srem(self.prefix_key(key), member).await.map_err(|e| {
            DomainError::store(format!("Failed to remove from set '{}': {}", key, e))
        })?;

        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, DomainError> {
        let mut conn = self.connection.clone();

        conn.smembers(self.prefix_key(key)).await.map_err(|e| {
            DomainError::store(format!("Failed to read set '{}': {}", key, e))
        })
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        conn.sismember(self.prefix_key(key), member).await.map_err(|e| {
            DomainError::store(format!("Failed to check set '{}': {}", key, e))
        })
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), DomainError> {
        let mut conn = self.connection.clone();

        let _: i64 = conn.rpush(self.prefix_key(key), value).await.map_err(|e| {
            DomainError::store(format!("Failed to push to list '{}': {}", key, e))
        })?;

        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, DomainError> {
        let mut conn = self.connection.clone();

        conn.lrange(self.prefix_key(key), 0, -1).await.map_err(|e| {
            DomainError::store(format!("Failed to read list '{}': {}", key, e))
        })
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), DomainError> {
        let mut conn = self.connection.clone();

        let _: i64 = conn
            .hset(self.prefix_key(key), field, value)
            .await
            .map_err(|e| {
                DomainError::store(format!("Failed to set field '{}' of '{}': {}", field, key, e))
            })?;

        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, DomainError> {
        let mut conn = self.connection.clone();

        conn.hget(self.prefix_key(key), field).await.map_err(|e| {
            DomainError::store(format!("Failed to get field '{}' of '{}': {}", field, key, e))
        })
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, DomainError> {
        let mut conn = self.connection.clone();

        conn.hgetall(self.prefix_key(key)).await.map_err(|e| {
            DomainError::store(format!("Failed to read hash '{}': {}", key, e))
        })
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let removed: i64 = conn.hdel(self.prefix_key(key), field).await.map_err(|e| {
            DomainError::store(format!(
                "Failed to delete field '{}' of '{}': {}",
                field, key, e
            ))
        })?;

        Ok(removed > 0)
    }

    async fn hash_increment(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, DomainError> {
        let mut conn = self.connection.clone();

        conn.hincr(self.prefix_key(key), field, delta)
            .await
            .map_err(|e| {
                DomainError::store(format!(
                    "Failed to increment field '{}' of '{}': {}",
                    field, key, e
                ))
            })
    }
}
