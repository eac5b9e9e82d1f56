//! In-memory visitor store scoped to one session

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::visitor::VisitorStore;
use crate::domain::DomainError;

/// Assignments held in process memory for a single session
#[derive(Debug, Default)]
pub struct SessionVisitorStore {
    entries: RwLock<HashMap<String, String>>,
}

impl SessionVisitorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously saved assignments
    pub fn from_entries(entries: HashMap<String, String>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Snapshot of every assignment, for writing back to a session
    pub fn entries(&self) -> Result<HashMap<String, String>, DomainError> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, String>>, DomainError> {
        self.entries
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, String>>, DomainError> {
        self.entries
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))
    }
}

#[async_trait]
impl VisitorStore for SessionVisitorStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DomainError> {
        self.write()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DomainError> {
        self.write()?.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, DomainError> {
        let mut keys: Vec<String> = self.read()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_store_roundtrip() {
        let store = SessionVisitorStore::new();

        store.set("button_color", "red").await.unwrap();
        store.set("button_color:finished", "true").await.unwrap();

        assert_eq!(store.get("button_color").await.unwrap(), Some("red".to_string()));
        assert_eq!(
            store.keys().await.unwrap(),
            vec!["button_color", "button_color:finished"]
        );

        store.delete("button_color").await.unwrap();
        assert!(store.get("button_color").await.unwrap().is_none());
        // Deleting twice is fine
        store.delete("button_color").await.unwrap();
    }

    #[test]
    fn test_session_store_from_entries() {
        let mut saved = HashMap::new();
        saved.insert("headline:2".to_string(), "short".to_string());

        let store = SessionVisitorStore::from_entries(saved);
        let value = tokio_test::block_on(store.get("headline:2")).unwrap();

        assert_eq!(value, Some("short".to_string()));
        assert_eq!(store.entries().unwrap().len(), 1);
    }
}
