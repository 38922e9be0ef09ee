//! AppD job and config records
//!
//! The job record is the staged, not yet applied configuration and doubles as
//! the "operation in progress" marker of its app instance. The config record
//! is the last successfully applied configuration.

use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::AppDConfig;
use crate::paths::KeyPaths;
use crate::traits::RuleStore;

/// Pending job of one app instance
pub struct AppDJobDb {
    store: Arc<dyn RuleStore>,
    path: String,
}

impl AppDJobDb {
    pub fn new(store: Arc<dyn RuleStore>, paths: &KeyPaths, app_instance_id: &str) -> Self {
        Self {
            store,
            path: paths.job(app_instance_id),
        }
    }

    /// Load the job; a job must name its operation
    pub async fn get(&self) -> Result<AppDConfig> {
        let bytes = self.store.get_record(&self.path).await?;
        let job: AppDConfig = serde_json::from_slice(&bytes)?;
        if job.operation.is_none() {
            return Err(Error::consistency(format!("job {} has no operation", self.path)));
        }
        Ok(job)
    }

    pub async fn exists(&self) -> Result<bool> {
        match self.store.get_record(&self.path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn put(&self, job: &AppDConfig) -> Result<()> {
        let bytes = serde_json::to_vec(job)?;
        self.store.put_record(&self.path, &bytes).await
    }

    /// Remove the job, ending the in-progress marker
    pub async fn delete(&self) -> Result<()> {
        debug!("Deleting job cache {}", self.path);
        self.store.delete_record(&self.path).await
    }
}

/// Durable config of one app instance
pub struct AppDConfigDb {
    store: Arc<dyn RuleStore>,
    path: String,
}

impl AppDConfigDb {
    pub fn new(store: Arc<dyn RuleStore>, paths: &KeyPaths, app_instance_id: &str) -> Self {
        Self {
            store,
            path: paths.appd_config(app_instance_id),
        }
    }

    /// Load the config; `None` before the first successful create
    pub async fn get(&self) -> Result<Option<AppDConfig>> {
        match self.store.get_record(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store `config` without its operation
    pub async fn put(&self, config: &AppDConfig) -> Result<()> {
        let bytes = serde_json::to_vec(&config.for_storage())?;
        self.store.put_record(&self.path, &bytes).await
    }

    pub async fn delete(&self) -> Result<()> {
        self.store.delete_record(&self.path).await
    }
}
