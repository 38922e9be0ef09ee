//! Task status persistence
//!
//! A [`TaskStatus`] record tracks one sync task: which rules it touches, how
//! (create/modify/delete), how far each rule got, and the overall progress.
//! [`StatusDb`] owns the in-memory copy during a task and keeps it in lockstep
//! with the stored record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::RuleKind;
use crate::paths::KeyPaths;
use crate::traits::RuleStore;

/// Progress value marking a failed task
pub const FAILURE_PROGRESS: i32 = -1;

/// How a rule is changed by a task
///
/// Derived once when the job is staged; never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Create,
    Modify,
    Delete,
}

/// Per-rule progress marker
///
/// Ordered: a rule only moves forward while applying and backward while
/// reverting. Traffic rules skip `WaitLocal`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum RuleState {
    /// Waiting for the data plane (Mp2) stage
    #[default]
    WaitMp2,
    /// Waiting for the local DNS server stage
    WaitLocal,
    /// Remote stages done; waiting for the final config write
    #[serde(rename = "WaitConfigDBWrite")]
    WaitConfigDbWrite,
}

impl RuleState {
    /// The terminal pre-commit state
    pub const TERMINAL: RuleState = RuleState::WaitConfigDbWrite;
}

/// Tracking record of one rule inside a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStatus {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Method")]
    pub method: Method,
    #[serde(rename = "State")]
    pub state: RuleState,
}

impl RuleStatus {
    /// A fresh status for a rule that has not been touched yet
    pub fn new(id: impl Into<String>, method: Method) -> Self {
        Self {
            id: id.into(),
            method,
            state: RuleState::default(),
        }
    }
}

/// Persisted status of one sync task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(rename = "progress")]
    pub progress: i32,
    #[serde(rename = "dnsRuleStatusLst", default)]
    pub dns_rule_status_lst: Vec<RuleStatus>,
    #[serde(rename = "trafficRuleStatusLst", default)]
    pub traffic_rule_status_lst: Vec<RuleStatus>,
    #[serde(rename = "details", default)]
    pub details: String,
}

impl TaskStatus {
    /// A fresh status with zero progress
    pub fn new(dns: Vec<RuleStatus>, traffic: Vec<RuleStatus>) -> Self {
        Self {
            progress: 0,
            dns_rule_status_lst: dns,
            traffic_rule_status_lst: traffic,
            details: String::new(),
        }
    }

    /// Status entries of one rule kind
    pub fn rules(&self, kind: RuleKind) -> &[RuleStatus] {
        match kind {
            RuleKind::Dns => &self.dns_rule_status_lst,
            RuleKind::Traffic => &self.traffic_rule_status_lst,
        }
    }

    fn rules_mut(&mut self, kind: RuleKind) -> &mut [RuleStatus] {
        match kind {
            RuleKind::Dns => &mut self.dns_rule_status_lst,
            RuleKind::Traffic => &mut self.traffic_rule_status_lst,
        }
    }

    /// Number of rules the task touches
    pub fn total_rules(&self) -> i32 {
        (self.dns_rule_status_lst.len() + self.traffic_rule_status_lst.len()) as i32
    }

    /// Externally visible state of the task
    pub fn task_state(&self) -> TaskState {
        if self.progress == FAILURE_PROGRESS {
            TaskState::Failure {
                details: self.details.clone(),
            }
        } else if self.progress == self.total_rules() {
            TaskState::Success
        } else {
            TaskState::Processing
        }
    }
}

/// Task state as reported to pollers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Processing,
    Success,
    Failure {
        /// First recorded failure reason
        details: String,
    },
}

impl TaskState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Processing => "PROCESSING",
            TaskState::Success => "SUCCESS",
            TaskState::Failure { .. } => "FAILURE",
        }
    }
}

/// Read and parse a task status record
pub async fn load_task_status(store: &dyn RuleStore, path: &str) -> Result<TaskStatus> {
    let bytes = store.get_record(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Report the outcome of a task
///
/// # Returns
///
/// - `Ok(())`: The task has not failed (it may still be running)
/// - `Err(Error::TaskFailed)`: Progress is the failure sentinel; carries `Details`
/// - `Err(_)`: The status record could not be read
pub async fn check_error_in_db(
    store: &dyn RuleStore,
    paths: &KeyPaths,
    app_instance_id: &str,
    task_id: &str,
) -> Result<()> {
    let status = load_task_status(store, &paths.task_status(app_instance_id, task_id)).await?;
    if status.progress == FAILURE_PROGRESS {
        return Err(Error::TaskFailed(status.details));
    }
    Ok(())
}

/// Owner of a task's status during processing
///
/// Every mutation is persisted before it is considered done; when the write
/// fails the in-memory copy is rolled back so it never runs ahead of the
/// stored record.
pub struct StatusDb {
    store: Arc<dyn RuleStore>,
    path: String,
    status: TaskStatus,
}

impl StatusDb {
    /// Wrap an already loaded status
    pub fn new(store: Arc<dyn RuleStore>, path: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            store,
            path: path.into(),
            status,
        }
    }

    /// Load the status record at `path`
    pub async fn load(store: Arc<dyn RuleStore>, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let status = load_task_status(store.as_ref(), &path).await?;
        Ok(Self::new(store, path, status))
    }

    /// Current in-memory status
    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    /// Status entry of a rule
    pub fn rule_status(&self, kind: RuleKind, rule_id: &str) -> Option<&RuleStatus> {
        self.status.rules(kind).iter().find(|s| s.id == rule_id)
    }

    /// Move a rule to `new_state` and persist
    ///
    /// Progress goes up by one when the rule reaches the terminal state and
    /// down by one when it leaves it. Unknown rules are rejected without
    /// touching anything.
    pub async fn set_state_and_progress(
        &mut self,
        kind: RuleKind,
        rule_id: &str,
        new_state: RuleState,
    ) -> Result<()> {
        let old_progress = self.status.progress;
        let entry = self
            .status
            .rules_mut(kind)
            .iter_mut()
            .find(|s| s.id == rule_id)
            .ok_or_else(|| {
                Error::consistency(format!("no {} rule status for id {}", kind, rule_id))
            })?;

        let old_state = entry.state;
        entry.state = new_state;

        if new_state == RuleState::TERMINAL && old_state != RuleState::TERMINAL {
            self.status.progress += 1;
        } else if old_state == RuleState::TERMINAL && new_state != RuleState::TERMINAL {
            self.status.progress -= 1;
        }

        if let Err(e) = self.push_db().await {
            warn!(
                "Failed to persist {} rule {} state {:?}: {}; rolling back",
                kind, rule_id, new_state, e
            );
            self.status.progress = old_progress;
            if let Some(entry) = self
                .status
                .rules_mut(kind)
                .iter_mut()
                .find(|s| s.id == rule_id)
            {
                entry.state = old_state;
            }
            return Err(e);
        }

        debug!("{} rule {}: {:?} -> {:?}", kind, rule_id, old_state, new_state);
        Ok(())
    }

    /// Write the whole status record
    pub async fn push_db(&self) -> Result<()> {
        let bytes = serde_json::to_vec(&self.status)?;
        self.store.put_record(&self.path, &bytes).await
    }

    /// Record the failure reason unless one is already set
    ///
    /// Returns whether the reason was recorded. Only kept in memory until the
    /// next write.
    pub fn set_failure_reason(&mut self, reason: impl Into<String>) -> bool {
        if !self.status.details.is_empty() {
            return false;
        }
        self.status.details = reason.into();
        true
    }

    /// Set the failure sentinel and persist (including any failure reason)
    pub async fn mark_failed(&mut self) -> Result<()> {
        let old_progress = self.status.progress;
        self.status.progress = FAILURE_PROGRESS;
        if let Err(e) = self.push_db().await {
            self.status.progress = old_progress;
            return Err(e);
        }
        Ok(())
    }

    /// Mark the task at `path` failed even when its record is unreadable
    ///
    /// A readable record keeps its rule lists; otherwise a fresh record is
    /// written carrying only the failure.
    pub async fn record_failure(
        store: Arc<dyn RuleStore>,
        path: impl Into<String>,
        reason: &str,
    ) -> Result<()> {
        let path = path.into();
        let mut db = match Self::load(store.clone(), path.clone()).await {
            Ok(db) => db,
            Err(e) => {
                warn!("Task status {} unreadable ({}); writing a fresh one", path, e);
                Self::new(store, path, TaskStatus::default())
            }
        };
        db.set_failure_reason(reason);
        db.mark_failed().await
    }
}
