//! Job staging and task status queries
//!
//! The caller side of a sync task: [`stage_job`] writes the job and a fresh
//! task status so a worker can pick the task up; [`query_task_status`]
//! reports how far it got.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{AppDConfig, DnsRule, Operation, Rule, TrafficRule};
use crate::paths::KeyPaths;
use crate::task::appd_db::{AppDConfigDb, AppDJobDb};
use crate::task::status_db::{Method, RuleStatus, StatusDb, TaskState, TaskStatus, load_task_status};
use crate::traits::RuleStore;

/// Whether a job is staged for the app instance
pub async fn is_any_ongoing_operation_exist(
    store: Arc<dyn RuleStore>,
    paths: &KeyPaths,
    app_instance_id: &str,
) -> Result<bool> {
    AppDJobDb::new(store, paths, app_instance_id).exists().await
}

/// Rule statuses for moving `stored` to `job` under `operation`
///
/// Unchanged rules are left out. Job rules come first in job order, then
/// deletions in stored order.
pub fn diff_rules<R: Rule>(job: &[R], stored: &[R], operation: Operation) -> Vec<RuleStatus> {
    if operation == Operation::Delete {
        return stored
            .iter()
            .map(|r| RuleStatus::new(r.id(), Method::Delete))
            .collect();
    }

    let stored_by_id: HashMap<&str, &R> = stored.iter().map(|r| (r.id(), r)).collect();
    let mut statuses: Vec<RuleStatus> = job
        .iter()
        .filter_map(|rule| match stored_by_id.get(rule.id()) {
            None => Some(RuleStatus::new(rule.id(), Method::Create)),
            Some(old) if *old != rule => Some(RuleStatus::new(rule.id(), Method::Modify)),
            Some(_) => None,
        })
        .collect();

    if operation == Operation::Update {
        statuses.extend(
            stored
                .iter()
                .filter(|old| !job.iter().any(|r| r.id() == old.id()))
                .map(|old| RuleStatus::new(old.id(), Method::Delete)),
        );
    }
    statuses
}

/// Stage `job` as task `task_id` of the app instance
///
/// Refuses while another job is staged. Create needs no stored config,
/// update and delete need one. The job is removed again when the status
/// cannot be written.
pub async fn stage_job(
    store: Arc<dyn RuleStore>,
    paths: &KeyPaths,
    app_instance_id: &str,
    task_id: &str,
    job: &AppDConfig,
) -> Result<TaskStatus> {
    let operation = job
        .operation
        .ok_or_else(|| Error::invalid_input("job has no operation"))?;

    let job_db = AppDJobDb::new(store.clone(), paths, app_instance_id);
    if job_db.exists().await? {
        return Err(Error::OperationInProgress(app_instance_id.to_string()));
    }

    let stored = AppDConfigDb::new(store.clone(), paths, app_instance_id)
        .get()
        .await?;
    let stored = match (operation, stored) {
        (Operation::Create, Some(_)) => {
            return Err(Error::invalid_input(format!(
                "AppD config of {} already exists",
                app_instance_id
            )));
        }
        (Operation::Create, None) => AppDConfig::default(),
        (_, Some(stored)) => stored,
        (_, None) => {
            return Err(Error::not_found(format!(
                "AppD config of {}",
                app_instance_id
            )));
        }
    };

    let status = TaskStatus::new(
        diff_rules::<DnsRule>(&job.app_dns_rule, &stored.app_dns_rule, operation),
        diff_rules::<TrafficRule>(&job.app_traffic_rule, &stored.app_traffic_rule, operation),
    );

    job_db.put(job).await?;
    let status_db = StatusDb::new(
        store.clone(),
        paths.task_status(app_instance_id, task_id),
        status.clone(),
    );
    if let Err(e) = status_db.push_db().await {
        warn!(
            "Failed to write status of task {} for {}: {}; removing job",
            task_id, app_instance_id, e
        );
        if let Err(cleanup) = job_db.delete().await {
            warn!("Failed to remove job of {}: {}", app_instance_id, cleanup);
        }
        return Err(e);
    }

    info!(
        "Staged {:?} task {} for {}: {} dns, {} traffic rule changes",
        operation,
        task_id,
        app_instance_id,
        status.dns_rule_status_lst.len(),
        status.traffic_rule_status_lst.len()
    );
    Ok(status)
}

/// Progress report of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProgress {
    pub state: TaskState,
    pub progress: i32,
    pub total: i32,
}

/// Read the status of a task and translate it for pollers
pub async fn query_task_status(
    store: &dyn RuleStore,
    paths: &KeyPaths,
    app_instance_id: &str,
    task_id: &str,
) -> Result<TaskProgress> {
    let status = load_task_status(store, &paths.task_status(app_instance_id, task_id)).await?;
    Ok(TaskProgress {
        state: status.task_state(),
        progress: status.progress,
        total: status.total_rules(),
    })
}
