//! Backing store trait definition

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

/// Shared key-value store with set, list, hash and counter primitives
///
/// Increments must be atomic on the store side. Callers never read a counter,
/// add locally and write it back.
#[async_trait]
pub trait SplitStore: Send + Sync + Debug {
    /// Gets a string value
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Sets a string value
    async fn set(&self, key: &str, value: &str) -> Result<(), DomainError>;

    /// Deletes a key of any type, returns true if it existed
    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    /// Checks if a key of any type exists
    async fn exists(&self, key: &str) -> Result<bool, DomainError>;

    /// Atomically increments a counter, returning the new value
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, DomainError>;

    /// Adds a member to a set, returns true if it was not present
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, DomainError>;

    /// Removes a member from a set, returns true if it was present
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, DomainError>;

    /// Returns all members of a set
    async fn set_members(&self, key: &str) -> Result<Vec<String>, DomainError>;

    /// Checks set membership
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, DomainError> {
        Ok(self.set_members(key).await?.iter().any(|m| m == member))
    }

    /// Appends a value to the tail of a list
    async fn list_push(&self, key: &str, value: &str) -> Result<(), DomainError>;

    /// Returns the whole list in order
    async fn list_range(&self, key: &str) -> Result<Vec<String>, DomainError>;

    /// Sets a hash field
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), DomainError>;

    /// Gets a hash field
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, DomainError>;

    /// Gets every field of a hash
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, DomainError>;

    /// Deletes a hash field, returns true if it existed
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, DomainError>;

    /// Atomically increments a hash field, returning the new value
    async fn hash_increment(&self, key: &str, field: &str, delta: i64)
        -> Result<i64, DomainError>;
}

/// Extension trait providing parsed reads
pub trait StoreExt: SplitStore {
    /// Reads a counter, treating a missing or malformed value as zero
    fn get_counter<'a>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<i64, DomainError>> + Send {
        async move { Ok(parse_counter(self.get(key).await?.as_deref())) }
    }

    /// Reads a hash field counter, treating a missing or malformed value as zero
    fn hash_get_counter<'a>(
        &'a self,
        key: &'a str,
        field: &'a str,
    ) -> impl std::future::Future<Output = Result<i64, DomainError>> + Send {
        async move { Ok(parse_counter(self.hash_get(key, field).await?.as_deref())) }
    }
}

// Blanket implementation for all types implementing SplitStore
impl<T: SplitStore + ?Sized> StoreExt for T {}

fn parse_counter(value: Option<&str>) -> i64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;

    /// Store that fails every call, for exercising fail-over paths
    #[derive(Debug, Default)]
    pub struct UnavailableStore;

    impl UnavailableStore {
        pub fn new() -> Self {
            Self
        }

        fn down<T>() -> Result<T, DomainError> {
            Err(DomainError::store("connection refused"))
        }
    }

    #[async_trait]
    impl SplitStore for UnavailableStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, DomainError> {
            Self::down()
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), DomainError> {
            Self::down()
        }

        async fn delete(&self, _key: &str) -> Result<bool, DomainError> {
            Self::down()
        }

        async fn exists(&self, _key: &str) -> Result<bool, DomainError> {
            Self::down()
        }

        async fn increment(&self, _key: &str, _delta: i64) -> Result<i64, DomainError> {
            Self::down()
        }

        async fn set_add(&self, _key: &str, _member: &str) -> Result<bool, DomainError> {
            Self::down()
        }

        async fn set_remove(&self, _key: &str, _member: &str) -> Result<bool, DomainError> {
            Self::down()
        }

        async fn set_members(&self, _key: &str) -> Result<Vec<String>, DomainError> {
            Self::down()
        }

        async fn list_push(&self, _key: &str, _value: &str) -> Result<(), DomainError> {
            Self::down()
        }

        async fn list_range(&self, _key: &str) -> Result<Vec<String>, DomainError> {
            Self::down()
        }

        async fn hash_set(&self, _key: &str, _field: &str, _value: &str) -> Result<(), DomainError> {
            Self::down()
        }

        async fn hash_get(&self, _key: &str, _field: &str) -> Result<Option<String>, DomainError> {
            Self::down()
        }

        async fn hash_get_all(&self, _key: &str) -> Result<HashMap<String, String>, DomainError> {
            Self::down()
        }

        async fn hash_delete(&self, _key: &str, _field: &str) -> Result<bool, DomainError> {
            Self::down()
        }

        async fn hash_increment(
            &self,
            _key: &str,
            _field: &str,
            _delta: i64,
        ) -> Result<i64, DomainError> {
            Self::down()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_unavailable_store_fails_every_call() {
            let store = UnavailableStore::new();

            assert!(store.get("k").await.is_err());
            assert!(store.increment("k", 1).await.is_err());
            assert!(store.get_counter("k").await.is_err());
        }

        #[test]
        fn test_parse_counter() {
            assert_eq!(parse_counter(Some("42")), 42);
            assert_eq!(parse_counter(Some(" 7 ")), 7);
            assert_eq!(parse_counter(Some("abc")), 0);
            assert_eq!(parse_counter(None), 0);
        }
    }
}
