// # Memory Rule Store
//
// In-memory implementation of RuleStore.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for deployments where jobs are re-staged after a
// restart anyway.
//
// ## Crash Behavior
//
// - All configs, jobs and task statuses are lost on restart/crash
// - No resume possible for in-flight tasks

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::error::store_code;
use crate::traits::rule_store::{RuleStore, RuleStoreFactory};

/// In-memory rule store implementation
///
/// This implementation stores all records in a HashMap protected by a RwLock.
/// Clones share the same records.
///
/// # Example
///
/// ```rust,no_run
/// use mep_core::store::MemoryRuleStore;
/// use mep_core::traits::RuleStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRuleStore::new();
///
///     store.put_record("/cse/appd/app-1", b"{}").await?;
///     assert_eq!(store.get_record("/cse/appd/app-1").await?, b"{}".to_vec());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleStore {
    inner: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryRuleStore {
    /// Create a new empty memory rule store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Whether a record exists at `path`
    pub async fn contains(&self, path: &str) -> bool {
        self.inner.read().await.contains_key(path)
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn get_record(&self, path: &str) -> Result<Vec<u8>, Error> {
        let guard = self.inner.read().await;
        guard
            .get(path)
            .cloned()
            .ok_or_else(|| Error::store(store_code::NOT_FOUND, format!("no record at {}", path)))
    }

    async fn put_record(&self, path: &str, value: &[u8]) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(path.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete_record(&self, path: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.remove(path);
        Ok(())
    }

    async fn list_paths(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        let mut paths: Vec<String> = guard
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

/// Factory for [`MemoryRuleStore`]
pub struct MemoryRuleStoreFactory;

#[async_trait]
impl RuleStoreFactory for MemoryRuleStoreFactory {
    async fn create(&self, _config: &serde_json::Value) -> Result<Box<dyn RuleStore>, Error> {
        Ok(Box::new(MemoryRuleStore::new()))
    }
}
