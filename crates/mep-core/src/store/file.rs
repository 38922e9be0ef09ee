// # File Rule Store
//
// File-based implementation of RuleStore with crash recovery.
//
// ## Purpose
//
// Keeps configs, pending jobs and task statuses across daemon restarts, so
// a crashed sync task leaves its job record and per-rule progress behind.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "/cse/appd/app-1": "{\"appDNSRule\":[],...}"
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::error::store_code;
use crate::traits::rule_store::{RuleStore, RuleStoreFactory};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based rule store with crash recovery
///
/// Every mutation rewrites the whole file atomically before returning, so a
/// successful `put_record` is durable.
///
/// Values must be UTF-8 (the engine writes JSON).
#[derive(Debug)]
pub struct FileRuleStore {
    path: PathBuf,
    // Held across the file write so concurrent writers cannot interleave
    records: Arc<RwLock<BTreeMap<String, String>>>,
}

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    records: BTreeMap<String, String>,
}

impl FileRuleStore {
    /// Create or load a file rule store
    ///
    /// This will:
    /// 1. Try to load existing store file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with empty state
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let records = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            records: Arc::new(RwLock::new(records)),
        })
    }

    /// Load records with automatic recovery from the backup file
    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<String, String>, Error> {
        match Self::load(path).await {
            Ok(records) => {
                tracing::debug!("Loaded rule store: {} records", records.len());
                Ok(records)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Rule store file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty store.");
                    return Ok(BTreeMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(records) => {
                        tracing::info!("Recovered rule store from backup: {} records", records.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore rule store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(records)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty store.",
                            backup_err
                        );
                        Ok(BTreeMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load records from file
    async fn load(path: &Path) -> Result<BTreeMap<String, String>, Error> {
        if !path.exists() {
            tracing::debug!("Rule store file does not exist: {}", path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(
                store_code::READ_FAILED,
                format!("Failed to read store file {}: {}", path.display(), e),
            )
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Rule store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.records)
    }

    /// Write records to file atomically
    async fn write(&self, records: &BTreeMap<String, String>) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            records: records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        let write_err = |e: std::io::Error| {
            Error::store(
                store_code::WRITE_FAILED,
                format!("Failed to write {}: {}", temp_path.display(), e),
            )
        };
        {
            let mut out = fs::File::create(&temp_path).await.map_err(write_err)?;
            out.write_all(json.as_bytes()).await.map_err(write_err)?;
            out.flush().await.map_err(write_err)?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(
                store_code::WRITE_FAILED,
                format!(
                    "Failed to rename {} to {}: {}",
                    temp_path.display(),
                    self.path.display(),
                    e
                ),
            )
        })?;

        tracing::trace!("Rule store written to file: {}", self.path.display());
        Ok(())
    }

    /// Apply a mutation and persist it; the in-memory map is only replaced
    /// once the file write succeeded
    async fn mutate<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut BTreeMap<String, String>) + Send,
    {
        let mut guard = self.records.write().await;
        let mut next = guard.clone();
        f(&mut next);
        self.write(&next).await?;
        *guard = next;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn get_record(&self, path: &str) -> Result<Vec<u8>, Error> {
        let guard = self.records.read().await;
        guard
            .get(path)
            .map(|value| value.clone().into_bytes())
            .ok_or_else(|| Error::store(store_code::NOT_FOUND, format!("no record at {}", path)))
    }

    async fn put_record(&self, path: &str, value: &[u8]) -> Result<(), Error> {
        let value = String::from_utf8(value.to_vec()).map_err(|e| {
            Error::store(
                store_code::WRITE_FAILED,
                format!("Value for {} is not UTF-8: {}", path, e),
            )
        })?;
        let key = path.to_string();
        self.mutate(move |records| {
            records.insert(key, value);
        })
        .await
    }

    async fn delete_record(&self, path: &str) -> Result<(), Error> {
        if !self.records.read().await.contains_key(path) {
            return Ok(());
        }
        self.mutate(|records| {
            records.remove(path);
        })
        .await
        .map_err(|e| Error::store(store_code::DELETE_FAILED, e.to_string()))
    }

    async fn list_paths(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let guard = self.records.read().await;
        Ok(guard
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every mutation is written through
        Ok(())
    }
}

/// Factory for [`FileRuleStore`]
pub struct FileRuleStoreFactory;

#[async_trait]
impl RuleStoreFactory for FileRuleStoreFactory {
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn RuleStore>, Error> {
        let path = config["path"]
            .as_str()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::config("File rule store requires a path"))?;
        Ok(Box::new(FileRuleStore::new(path).await?))
    }
}
