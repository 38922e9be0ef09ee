// # Rule Store Trait
//
// Defines the key-value persistence used by the synchronization engine.
//
// ## Purpose
//
// The rule store holds three kinds of records:
// - The durable AppD config of each app instance
// - The pending job (its presence marks an operation in progress)
// - The task status (per-rule progress of a sync task)
//
// Values are opaque bytes; the engine stores JSON.
//
// ## Implementations
//
// - Memory: `MemoryRuleStore`
// - File: `FileRuleStore` (JSON file, atomic writes)
// - Future: etcd, Redis, etc.

use async_trait::async_trait;
use tracing::warn;

/// Trait for rule store implementations
///
/// All methods must be safe to call concurrently from multiple tasks; several
/// sync tasks share one store.
///
/// # Errors
///
/// Failures are reported as [`crate::Error::Store`] carrying an integer code,
/// or [`crate::Error::NotFound`] for a missing record.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Read a record
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<u8>)`: The stored value
    /// - `Err(Error::NotFound)`: No record at `path`
    /// - `Err(Error::Store)`: Storage error
    async fn get_record(&self, path: &str) -> Result<Vec<u8>, crate::Error>;

    /// Create or overwrite a record
    async fn put_record(&self, path: &str, value: &[u8]) -> Result<(), crate::Error>;

    /// Delete a record
    ///
    /// Deleting a record that does not exist succeeds.
    async fn delete_record(&self, path: &str) -> Result<(), crate::Error>;

    /// Delete several records
    ///
    /// With `continue_on_failure`, every path is attempted and the first
    /// error is returned at the end; otherwise the first error stops the
    /// loop.
    async fn delete_paths(
        &self,
        paths: &[String],
        continue_on_failure: bool,
    ) -> Result<(), crate::Error> {
        let mut first_error = None;
        for path in paths {
            if let Err(e) = self.delete_record(path).await {
                if !continue_on_failure {
                    return Err(e);
                }
                warn!("Failed to delete {}: {}", path, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// List all record paths starting with `prefix`
    async fn list_paths(&self, prefix: &str) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing rule stores from configuration
#[async_trait]
pub trait RuleStoreFactory: Send + Sync {
    /// Create a RuleStore instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: The serialized [`crate::config::RuleStoreConfig`]
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn RuleStore>, crate::Error>;
}
