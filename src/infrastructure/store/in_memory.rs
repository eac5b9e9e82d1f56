//! In-memory backing store implementation
//!
//! Suitable for tests and single-process deployments. Every operation takes
//! the map lock once, so increments are atomic with respect to other tasks
//! sharing the same instance.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::store::SplitStore;
use crate::domain::DomainError;

/// Value held under one key
#[derive(Debug, Clone)]
enum Entry {
    Str(String),
    Set(BTreeSet<String>),
    List(Vec<String>),
    Hash(HashMap<String, String>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Set(_) => "set",
            Self::List(_) => "list",
            Self::Hash(_) => "hash",
        }
    }
}

fn wrong_type(key: &str, entry: &Entry, expected: &str) -> DomainError {
    DomainError::store(format!(
        "Key '{}' holds a {} but a {} was expected",
        key,
        entry.kind(),
        expected
    ))
}

fn parse_integer(key: &str, value: &str) -> Result<i64, DomainError> {
    value
        .parse()
        .map_err(|_| DomainError::store(format!("Value at '{}' is not an integer", key)))
}

/// In-memory store implementation
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Entry>>, DomainError> {
        self.entries
            .read()
            .map_err(|e| DomainError::store(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Entry>>, DomainError> {
        self.entries
            .write()
            .map_err(|e| DomainError::store(format!("Failed to acquire write lock: {}", e)))
    }
}

#[async_trait]
impl SplitStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError> {
        match self.read()?.get(key) {
            Some(Entry::Str(value)) => Ok(Some(value.clone())),
            Some(other) => Err(wrong_type(key, other, "string")),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DomainError> {
        self.write()?
            .insert(key.to_string(), Entry::Str(value.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.write()?.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.read()?.contains_key(key))
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, DomainError> {
        let mut entries = self.write()?;

        let current = match entries.get(key) {
            Some(Entry::Str(value)) => parse_integer(key, value)?,
            Some(other) => return Err(wrong_type(key, other, "string")),
            None => 0,
        };

        let new_value = current + delta;
        entries.insert(key.to_string(), Entry::Str(new_value.to_string()));

        Ok(new_value)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, DomainError> {
        let mut entries = self.write()?;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()));

        match entry {
            Entry::Set(members) => Ok(members.insert(member.to_string())),
            other => Err(wrong_type(key, other, "set")),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, DomainError> {
        let mut entries = self.write()?;

        let (removed, now_empty) = match entries.get_mut(key) {
            Some(Entry::Set(members)) => (members.remove(member), members.is_empty()),
            Some(other) => return Err(wrong_type(key, other, "set")),
            None => (false, false),
        };

        if now_empty {
            entries.remove(key);
        }

        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, DomainError> {
        match self.read()?.get(key) {
            Some(Entry::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(other) => Err(wrong_type(key, other, "set")),
            None => Ok(Vec::new()),
        }
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, DomainError> {
        match self.read()?.get(key) {
            Some(Entry::Set(members)) => Ok(members.contains(member)),
            Some(other) => Err(wrong_type(key, other, "set")),
            None => Ok(false),
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), DomainError> {
        let mut entries = self.write()?;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(Vec::new()));

        match entry {
            Entry::List(items) => {
                items.push(value.to_string());
                Ok(())
            }
            other => Err(wrong_type(key, other, "list")),
        }
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, DomainError> {
        match self.read()?.get(key) {
            Some(Entry::List(items)) => Ok(items.clone()),
            Some(other) => Err(wrong_type(key, other, "list")),
            None => Ok(Vec::new()),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), DomainError> {
        let mut entries = self.write()?;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));

        match entry {
            Entry::Hash(fields) => {
                fields.insert(field.to_string(), value.to_string());
                Ok(())
            }
            other => Err(wrong_type(key, other, "hash")),
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, DomainError> {
        match self.read()?.get(key) {
            Some(Entry::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(other) => Err(wrong_type(key, other, "hash")),
            None => Ok(None),
        }
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, DomainError> {
        match self.read()?.get(key) {
            Some(Entry::Hash(fields)) => Ok(fields.clone()),
            Some(other) => Err(wrong_type(key, other, "hash")),
            None => Ok(HashMap::new()),
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, DomainError> {
        let mut entries = self.write()?;

        let (removed, now_empty) = match entries.get_mut(key) {
            Some(Entry::Hash(fields)) => (fields.remove(field).is_some(), fields.is_empty()),
            Some(other) => return Err(wrong_type(key, other, "hash")),
            None => (false, false),
        };

        if now_empty {
            entries.remove(key);
        }

        Ok(removed)
    }

    async fn hash_increment(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, DomainError> {
        let mut entries = self.write()?;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));

        match entry {
            Entry::Hash(fields) => {
                let current = match fields.get(field) {
                    Some(value) => parse_integer(key, value)?,
                    None => 0,
                };
                let new_value = current + delta;
                fields.insert(field.to_string(), new_value.to_string());
                Ok(new_value)
            }
            other => Err(wrong_type(key, other, "hash")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::StoreExt;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_string_get_set_delete() {
        let store = InMemoryStore::new();

        store.set("metric", "checkout").await.unwrap();
        assert_eq!(store.get("metric").await.unwrap(), Some("checkout".to_string()));
        assert!(store.exists("metric").await.unwrap());

        assert!(store.delete("metric").await.unwrap());
        assert!(!store.delete("metric").await.unwrap());
        assert!(store.get("metric").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment() {
        let store = InMemoryStore::new();

        assert_eq!(store.increment("config_version", 1).await.unwrap(), 1);
        assert_eq!(store.increment("config_version", 2).await.unwrap(), 3);
        assert_eq!(store.get_counter("config_version").await.unwrap(), 3);
        assert_eq!(store.get_counter("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sets() {
        let store = InMemoryStore::new();

        assert!(store.set_add("experiments", "b").await.unwrap());
        assert!(store.set_add("experiments", "a").await.unwrap());
        assert!(!store.set_add("experiments", "a").await.unwrap());

        assert_eq!(store.set_members("experiments").await.unwrap(), vec!["a", "b"]);
        assert!(store.set_contains("experiments", "a").await.unwrap());

        assert!(store.set_remove("experiments", "a").await.unwrap());
        assert!(store.set_remove("experiments", "b").await.unwrap());
        assert!(!store.exists("experiments").await.unwrap());
    }

    #[tokio::test]
    async fn test_lists_keep_order() {
        let store = InMemoryStore::new();

        store.list_push("button_color", "red").await.unwrap();
        store.list_push("button_color", "blue").await.unwrap();

        assert_eq!(
            store.list_range("button_color").await.unwrap(),
            vec!["red", "blue"]
        );
        assert!(store.list_range("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hashes() {
        let store = InMemoryStore::new();

        store.hash_set("versions", "button_color", "2").await.unwrap();
        assert_eq!(
            store.hash_get("versions", "button_color").await.unwrap(),
            Some("2".to_string())
        );
        assert_eq!(store.hash_increment("versions", "button_color", 1).await.unwrap(), 3);
        assert_eq!(store.hash_get_counter("versions", "headline").await.unwrap(), 0);

        let all = store.hash_get_all("versions").await.unwrap();
        assert_eq!(all.len(), 1);

        assert!(store.hash_delete("versions", "button_color").await.unwrap());
        assert!(!store.exists("versions").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type_is_a_store_error() {
        let store = InMemoryStore::new();
        store.set("button_color", "red").await.unwrap();

        let err = store.list_push("button_color", "blue").await.unwrap_err();
        assert!(matches!(err, DomainError::Store { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_atomic() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store
                        .hash_increment("button_color:red", "participant_count", 1)
                        .await
                        .unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(
            store
                .hash_get_counter("button_color:red", "participant_count")
                .await
                .unwrap(),
            800
        );
    }
}
