//! AppD sync task
//!
//! A [`Task`] reconciles one `(appInstanceId, taskId)` pair: it drives every
//! rule named in the task status through its [`DispatchTable`], touching the
//! data plane and the local DNS server stage by stage, and persists each step
//! through [`StatusDb`] so a rerun resumes where the last one stopped.
//!
//! ## Flow
//!
//! ```text
//! job + config + status ──► Task::load
//!                               │
//!              apply DNS rules ─┤─ error ─► revert DNS, revert traffic
//!          apply traffic rules ─┤─ error ─► revert DNS, revert traffic
//!                commit config ─┘
//! ```

pub mod appd_db;
pub mod rule_map;
pub mod staging;
pub mod state_machine;
pub mod status_db;

pub use appd_db::{AppDConfigDb, AppDJobDb};
pub use rule_map::RuleMaps;
pub use staging::{diff_rules, is_any_ongoing_operation_exist, query_task_status, stage_job};
pub use state_machine::{DispatchTable, Endpoint, RemoteTargets, RulePrimitives, StageOp, Transition};
pub use status_db::{
    FAILURE_PROGRESS, Method, RuleState, RuleStatus, StatusDb, TaskState, TaskStatus,
    check_error_in_db,
};

use std::sync::Arc;
use tracing::{error, info};

use crate::config::DnsAgentMode;
use crate::error::{Error, Result};
use crate::model::{AppDConfig, AppInfo, DnsRule, Operation, Rule, RuleSource, TrafficRule};
use crate::paths::KeyPaths;
use crate::traits::{DataPlane, DnsAgent, RuleStore};

/// Failure reason recorded when the DNS rules could not be applied
pub const DNS_APPLY_FAILURE: &str = "Failed to apply DNS rules";
/// Failure reason recorded when the traffic rules could not be applied
pub const TRAFFIC_APPLY_FAILURE: &str = "Failed to apply traffic rules";
/// Failure reason recorded when the final config write failed
pub const CONFIG_COMMIT_FAILURE: &str = "Failed to save the configuration";
/// Failure reason recorded when the task could not even be built
pub const UNEXPECTED_FAILURE: &str = "Unexpected error in processing";

/// Collaborators shared by all tasks of a worker
#[derive(Clone)]
pub struct TaskContext {
    pub store: Arc<dyn RuleStore>,
    pub dns_agent: Arc<dyn DnsAgent>,
    pub data_plane: Arc<dyn DataPlane>,
    pub dns_mode: DnsAgentMode,
    pub paths: KeyPaths,
}

/// One AppD sync task
pub struct Task {
    task_id: String,
    operation: Operation,
    job: AppDConfig,
    status_db: StatusDb,
    job_db: AppDJobDb,
    config_db: AppDConfigDb,
    dns_table: DispatchTable,
    traffic_table: DispatchTable,
    dns_rules: RuleMaps<DnsRule>,
    traffic_rules: RuleMaps<TrafficRule>,
    targets: RemoteTargets,
}

impl Task {
    /// Build a task from the job, config and status records
    ///
    /// The job and the status must exist; the config is absent before the
    /// first successful create.
    pub async fn load(
        ctx: &TaskContext,
        app_name: &str,
        app_instance_id: &str,
        task_id: &str,
    ) -> Result<Self> {
        let job_db = AppDJobDb::new(ctx.store.clone(), &ctx.paths, app_instance_id);
        let config_db = AppDConfigDb::new(ctx.store.clone(), &ctx.paths, app_instance_id);

        let job = job_db.get().await?;
        let operation = job
            .operation
            .ok_or_else(|| Error::consistency("job has no operation"))?;
        let stored = config_db.get().await?.unwrap_or_default();
        let status_db = StatusDb::load(
            ctx.store.clone(),
            ctx.paths.task_status(app_instance_id, task_id),
        )
        .await?;

        let dns_rules = build_maps::<DnsRule>(&job, &stored, status_db.status());
        let traffic_rules = build_maps::<TrafficRule>(&job, &stored, status_db.status());

        Ok(Self {
            task_id: task_id.to_string(),
            operation,
            job,
            status_db,
            job_db,
            config_db,
            dns_table: DispatchTable::dns(ctx.dns_mode),
            traffic_table: DispatchTable::traffic(),
            dns_rules,
            traffic_rules,
            targets: RemoteTargets {
                app: AppInfo {
                    instance_id: app_instance_id.to_string(),
                    name: app_name.to_string(),
                },
                dns_agent: ctx.dns_agent.clone(),
                data_plane: ctx.data_plane.clone(),
            },
        })
    }

    pub fn app(&self) -> &AppInfo {
        &self.targets.app
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn status(&self) -> &TaskStatus {
        self.status_db.status()
    }

    /// Drive every DNS rule to the terminal state
    pub async fn process_dns_rules_apply(&mut self) -> Result<()> {
        apply_rules(
            &mut self.status_db,
            &self.dns_table,
            &self.dns_rules,
            &self.targets,
        )
        .await
    }

    /// Drive every traffic rule to the terminal state
    pub async fn process_traffic_rules_apply(&mut self) -> Result<()> {
        apply_rules(
            &mut self.status_db,
            &self.traffic_table,
            &self.traffic_rules,
            &self.targets,
        )
        .await
    }

    /// Walk every DNS rule back to the first state; failures are only logged
    pub async fn revert_dns_rules(&mut self) {
        revert_rules(
            &mut self.status_db,
            &self.dns_table,
            &self.dns_rules,
            &self.targets,
        )
        .await
    }

    /// Walk every traffic rule back to the first state; failures are only logged
    pub async fn revert_traffic_rules(&mut self) {
        revert_rules(
            &mut self.status_db,
            &self.traffic_table,
            &self.traffic_rules,
            &self.targets,
        )
        .await
    }

    /// Write (create/update) or delete (delete) the durable config
    pub async fn commit_config(&self) -> Result<()> {
        match self.operation {
            Operation::Create | Operation::Update => self.config_db.put(&self.job).await,
            Operation::Delete => self.config_db.delete().await,
        }
    }

    /// Delete the job record
    pub async fn cleanup_job(&self) -> Result<()> {
        self.job_db.delete().await
    }

    /// Record the failure reason unless one is already recorded
    pub fn set_failure_reason(&mut self, reason: impl Into<String>) -> bool {
        self.status_db.set_failure_reason(reason)
    }

    /// Persist the failure sentinel
    pub async fn mark_failed(&mut self) -> Result<()> {
        self.status_db.mark_failed().await
    }
}

fn build_maps<R: RuleSource>(job: &AppDConfig, stored: &AppDConfig, status: &TaskStatus) -> RuleMaps<R> {
    RuleMaps::build(job.rules::<R>(), stored.rules::<R>(), status.rules(R::KIND))
}

fn snapshot(status_db: &StatusDb, kind: crate::model::RuleKind) -> Vec<RuleStatus> {
    status_db.status().rules(kind).to_vec()
}

async fn apply_rules<R, P>(
    status_db: &mut StatusDb,
    table: &DispatchTable,
    maps: &RuleMaps<R>,
    prims: &P,
) -> Result<()>
where
    R: Rule,
    P: RulePrimitives<R>,
{
    for entry in snapshot(status_db, table.kind()) {
        apply_entry(status_db, table, maps, prims, &entry).await?;
    }
    Ok(())
}

/// Advance one rule from its stored state to the terminal state
async fn apply_entry<R, P>(
    status_db: &mut StatusDb,
    table: &DispatchTable,
    maps: &RuleMaps<R>,
    prims: &P,
    entry: &RuleStatus,
) -> Result<()>
where
    R: Rule,
    P: RulePrimitives<R>,
{
    let terminal = table.terminal_state();
    let mut state = entry.state;

    while state != terminal {
        let transition = table.transition(entry.method, state).ok_or_else(|| {
            Error::consistency(format!(
                "{} rule {} has no transition for {:?} in {:?}",
                table.kind(),
                entry.id,
                entry.method,
                state
            ))
        })?;

        if let Some(op) = transition.op {
            op.apply(
                prims,
                &entry.id,
                maps.apply_new(&entry.id),
                maps.apply_old(&entry.id),
            )
            .await
            .inspect_err(|e| {
                error!(
                    "Failed to apply {} rule {} at {:?}: {}",
                    table.kind(),
                    entry.id,
                    state,
                    e
                )
            })?;
        }

        status_db
            .set_state_and_progress(table.kind(), &entry.id, transition.next)
            .await?;
        state = transition.next;
    }

    Ok(())
}

async fn revert_rules<R, P>(
    status_db: &mut StatusDb,
    table: &DispatchTable,
    maps: &RuleMaps<R>,
    prims: &P,
) where
    R: Rule,
    P: RulePrimitives<R>,
{
    // Status entries are re-read so states reached during apply are seen
    for entry in snapshot(status_db, table.kind()) {
        if let Err(e) = revert_entry(status_db, table, maps, prims, &entry).await {
            error!(
                "Failed to revert {} rule {}: {}, this will lead to data inconsistency",
                table.kind(),
                entry.id,
                e
            );
        }
    }
}

/// Walk one rule back from its stored state to the first state
///
/// The stage at the stored state never took effect and is not reverted.
async fn revert_entry<R, P>(
    status_db: &mut StatusDb,
    table: &DispatchTable,
    maps: &RuleMaps<R>,
    prims: &P,
    entry: &RuleStatus,
) -> Result<()>
where
    R: Rule,
    P: RulePrimitives<R>,
{
    let first = table.first_state();
    let mut state = entry.state;

    while state != first {
        let previous = table.previous_state(state).ok_or_else(|| {
            Error::consistency(format!(
                "{} rule {} is in unknown state {:?}",
                table.kind(),
                entry.id,
                state
            ))
        })?;
        let transition = table.transition(entry.method, previous).ok_or_else(|| {
            Error::consistency(format!(
                "{} rule {} has no transition for {:?} in {:?}",
                table.kind(),
                entry.id,
                entry.method,
                previous
            ))
        })?;

        if let Some(op) = transition.op {
            op.revert(
                prims,
                &entry.id,
                maps.revert_target(&entry.id),
                maps.revert_current(&entry.id),
            )
            .await?;
        }

        status_db
            .set_state_and_progress(table.kind(), &entry.id, previous)
            .await?;
        info!("Reverted {} rule {} to {:?}", table.kind(), entry.id, previous);
        state = previous;
    }

    Ok(())
}
