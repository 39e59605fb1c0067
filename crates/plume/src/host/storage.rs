use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;

/// Which storage area a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    /// Survives restarts (`localStorage`)
    Local,
    /// Scoped to the current tab (`sessionStorage`)
    Session,
}

/// Pluggable string key/value storage.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a value.
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>, StorageError>;
    /// Write a value.
    async fn set(&self, area: StorageArea, key: &str, value: String) -> Result<(), StorageError>;
    /// Delete a value. Deleting a missing key is not an error.
    async fn remove(&self, area: StorageArea, key: &str) -> Result<(), StorageError>;
}

/// In-memory storage suitable for native hosts and tests.
#[derive(Clone, Default)]
pub struct MemoryStorage(Arc<RwLock<HashMap<(StorageArea, String), String>>>);

impl MemoryStorage {
    /// Number of stored entries across both areas.
    pub async fn len(&self) -> usize {
        self.0.read().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.0.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.0.read().await.get(&(area, key.to_string())).cloned())
    }

    async fn set(&self, area: StorageArea, key: &str, value: String) -> Result<(), StorageError> {
        self.0.write().await.insert((area, key.to_string()), value);
        Ok(())
    }

    async fn remove(&self, area: StorageArea, key: &str) -> Result<(), StorageError> {
        self.0.write().await.remove(&(area, key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn areas_are_separate() {
        let s = MemoryStorage::default();
        s.set(StorageArea::Local, "k", "local".into()).await.unwrap();
        s.set(StorageArea::Session, "k", "session".into()).await.unwrap();
        assert_eq!(s.get(StorageArea::Local, "k").await.unwrap().as_deref(), Some("local"));
        s.remove(StorageArea::Local, "k").await.unwrap();
        assert_eq!(s.get(StorageArea::Local, "k").await.unwrap(), None);
        assert_eq!(s.len().await, 1);
    }
}
