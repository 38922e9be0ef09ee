//! Logical key layout in the rule store
//!
//! ```text
//! <root>/appd/<appInstanceId>                      durable config
//! <root>/applcm/jobs/<appInstanceId>               pending job
//! <root>/applcm/taskstatus/<appInstanceId>/<task>  task status
//! ```

/// Default key root
pub const DEFAULT_KEY_ROOT: &str = "/cse";

/// Builds store keys under a configurable root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    root: String,
}

impl KeyPaths {
    /// Create key paths under `root` (a trailing `/` is ignored)
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    /// Durable AppD config of an app instance
    pub fn appd_config(&self, app_instance_id: &str) -> String {
        format!("{}/appd/{}", self.root, app_instance_id)
    }

    /// Prefix of all pending jobs
    pub fn jobs_prefix(&self) -> String {
        format!("{}/applcm/jobs/", self.root)
    }

    /// Pending job of an app instance
    pub fn job(&self, app_instance_id: &str) -> String {
        format!("{}{}", self.jobs_prefix(), app_instance_id)
    }

    /// Prefix of all task statuses of an app instance
    pub fn task_status_prefix(&self, app_instance_id: &str) -> String {
        format!("{}/applcm/taskstatus/{}/", self.root, app_instance_id)
    }

    /// Status record of one task
    pub fn task_status(&self, app_instance_id: &str, task_id: &str) -> String {
        format!("{}{}", self.task_status_prefix(app_instance_id), task_id)
    }
}

impl Default for KeyPaths {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_ROOT)
    }
}
