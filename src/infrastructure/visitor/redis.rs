//! Backing-store visitor store: one hash per visitor id

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::store::SplitStore;
use crate::domain::visitor::VisitorStore;
use crate::domain::DomainError;

/// Default namespace for visitor hashes
pub const DEFAULT_VISITOR_NAMESPACE: &str = "visitors";

/// Visitor assignments kept in the shared store
///
/// Usually backed by a [`RedisStore`](crate::infrastructure::store::RedisStore)
/// so a visitor keeps its assignments across devices and sessions.
#[derive(Debug, Clone)]
pub struct RedisVisitorStore {
    store: Arc<dyn SplitStore>,
    hash_key: String,
}

impl RedisVisitorStore {
    pub fn new(store: Arc<dyn SplitStore>, visitor_id: &str) -> Self {
        Self::with_namespace(store, DEFAULT_VISITOR_NAMESPACE, visitor_id)
    }

    pub fn with_namespace(store: Arc<dyn SplitStore>, namespace: &str, visitor_id: &str) -> Self {
        Self {
            store,
            hash_key: format!("{}:{}", namespace, visitor_id),
        }
    }

    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }
}

#[async_trait]
impl VisitorStore for RedisVisitorStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError> {
        self.store.hash_get(&self.hash_key, key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DomainError> {
        self.store.hash_set(&self.hash_key, key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), DomainError> {
        self.store.hash_delete(&self.hash_key, key).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, DomainError> {
        let mut keys: Vec<String> = self
            .store
            .hash_get_all(&self.hash_key)
            .await?
            .into_keys()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
