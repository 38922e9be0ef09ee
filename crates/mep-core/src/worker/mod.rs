//! AppD sync worker
//!
//! The Worker runs staged sync tasks:
//! - Builds a [`Task`] from the job, config and status records
//! - Applies DNS rules, then traffic rules, then commits the config
//! - Reverts every rule and marks the task failed when any step fails
//! - Keeps a panic inside one task from taking the process down
//!
//! ## Lifecycle
//!
//! 1. Create with [`Worker::new()`]
//! 2. Hand staged tasks to [`Worker::start_new_task()`]
//! 3. Call [`Worker::shutdown()`] to wait for tasks still running

use std::sync::{Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::task::status_db::StatusDb;
use crate::task::{
    AppDJobDb, CONFIG_COMMIT_FAILURE, DNS_APPLY_FAILURE, TRAFFIC_APPLY_FAILURE, Task, TaskContext,
    UNEXPECTED_FAILURE,
};

/// Runs AppD sync tasks in the background
pub struct Worker {
    ctx: TaskContext,
    tasks: Mutex<JoinSet<()>>,
}

impl Worker {
    pub fn new(ctx: TaskContext) -> Self {
        Self {
            ctx,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Run a sync task in the background
    ///
    /// Must be called from within a tokio runtime. A panic inside the task is
    /// logged; the task status is left as it was.
    pub fn start_new_task(&self, app_name: &str, app_instance_id: &str, task_id: &str) {
        let ctx = self.ctx.clone();
        let app_name = app_name.to_string();
        let app_instance_id = app_instance_id.to_string();
        let task_id = task_id.to_string();

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                warn!("Sync task supervisor ended abnormally: {}", e);
            }
        }

        tasks.spawn(async move {
            let inner = tokio::spawn({
                let app_instance_id = app_instance_id.clone();
                let task_id = task_id.clone();
                async move { process(ctx, &app_name, &app_instance_id, &task_id).await }
            });
            if let Err(e) = inner.await {
                if e.is_panic() {
                    error!(
                        "Sync task {} for {} panicked; task status left unchanged",
                        task_id, app_instance_id
                    );
                } else {
                    warn!("Sync task {} for {} was cancelled", task_id, app_instance_id);
                }
            }
        });
    }

    /// Run a sync task to completion on the current task
    ///
    /// The outcome is in the task status; see
    /// [`crate::task::check_error_in_db`].
    pub async fn process_data_plane_sync(
        &self,
        app_name: &str,
        app_instance_id: &str,
        task_id: &str,
    ) {
        process(self.ctx.clone(), app_name, app_instance_id, task_id).await
    }

    /// Number of tasks started and not yet reaped
    pub fn in_flight(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait for every started task to finish
    ///
    /// Tasks started while draining are waited for as well.
    pub async fn shutdown(&self) {
        loop {
            let mut tasks =
                std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
            if tasks.is_empty() {
                break;
            }
            info!("Waiting for {} sync task(s) to finish", tasks.len());
            while let Some(finished) = tasks.join_next().await {
                if let Err(e) = finished {
                    warn!("Sync task supervisor ended abnormally: {}", e);
                }
            }
        }
        info!("All sync tasks finished");
    }
}

async fn process(ctx: TaskContext, app_name: &str, app_instance_id: &str, task_id: &str) {
    info!("Sync task {} for {} ({}) started", task_id, app_instance_id, app_name);

    let mut task = match Task::load(&ctx, app_name, app_instance_id, task_id).await {
        Ok(task) => task,
        Err(e) => {
            error!(
                "Cannot build sync task {} for {}: {}",
                task_id, app_instance_id, e
            );
            fail_unprocessable(&ctx, app_instance_id, task_id).await;
            return;
        }
    };

    if let Err(e) = task.process_dns_rules_apply().await {
        abort(&mut task, DNS_APPLY_FAILURE, e).await;
        return;
    }
    if let Err(e) = task.process_traffic_rules_apply().await {
        abort(&mut task, TRAFFIC_APPLY_FAILURE, e).await;
        return;
    }
    if let Err(e) = task.commit_config().await {
        abort(&mut task, CONFIG_COMMIT_FAILURE, e).await;
        return;
    }
    if let Err(e) = task.cleanup_job().await {
        // The task reads as succeeded but new jobs stay blocked
        error!(
            "Sync task {} for {} succeeded but its job cache could not be deleted: {}",
            task_id, app_instance_id, e
        );
    }

    info!(
        "Sync task {} for {} succeeded ({} rules)",
        task_id,
        app_instance_id,
        task.status().progress
    );
}

/// Revert everything, then record the failure and drop the job
async fn abort(task: &mut Task, reason: &str, err: Error) {
    error!(
        "Sync task {} for {} failed: {}: {}",
        task.task_id(),
        task.app().instance_id,
        reason,
        err
    );
    task.set_failure_reason(reason);

    task.revert_dns_rules().await;
    task.revert_traffic_rules().await;

    if let Err(e) = task.mark_failed().await {
        error!(
            "Failed to mark task {} for {} as failed: {}",
            task.task_id(),
            task.app().instance_id,
            e
        );
    }
    if let Err(e) = task.cleanup_job().await {
        error!("Failed to delete job cache of {}: {}", task.app().instance_id, e);
    }
}

async fn fail_unprocessable(ctx: &TaskContext, app_instance_id: &str, task_id: &str) {
    if let Err(e) = AppDJobDb::new(ctx.store.clone(), &ctx.paths, app_instance_id)
        .delete()
        .await
    {
        error!("Failed to delete job cache of {}: {}", app_instance_id, e);
    }

    let path = ctx.paths.task_status(app_instance_id, task_id);
    match StatusDb::record_failure(ctx.store.clone(), path, UNEXPECTED_FAILURE).await {
        Ok(()) => debug!("Task {} for {} marked failed", task_id, app_instance_id),
        Err(e) => error!(
            "Failed to mark task {} for {} as failed: {}",
            task_id, app_instance_id, e
        ),
    }
}
