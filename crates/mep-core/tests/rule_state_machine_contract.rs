//! Architectural Contract Test: Rule State Machine
//!
//! This test verifies that rules move through their stages the way the sync
//! engine relies on for crash recovery and rollback.
//!
//! Constraints verified:
//! - Applying resumes from the stored rule state and never redoes a stage
//! - Progress grows by exactly one per rule reaching the terminal state
//! - Reverting undoes exactly the completed stages, newest first
//! - A failed status write leaves memory and store in agreement
//!
//! If this test fails, task resumption or rollback is broken.

mod common;

use common::*;
use mep_core::config::DnsAgentMode;
use mep_core::model::{Operation, RuleActivation};
use mep_core::task::{RuleState, Task};

#[tokio::test]
async fn apply_resumes_from_stored_state() {
    let h = Harness::new(DnsAgentMode::All);
    h.stage(
        "t1",
        job(
            Operation::Create,
            vec![dns_rule("d1", "example.com", RuleActivation::Active)],
            vec![],
        ),
    )
    .await;

    // First run dies at the local stage after Mp2 succeeded
    h.dns_agent.faults.fail_on("local_set");
    let mut task = Task::load(&h.ctx(), APP_NAME, APP, "t1").await.unwrap();
    assert!(task.process_dns_rules_apply().await.is_err());
    assert_eq!(h.status("t1").await.dns_rule_status_lst[0].state, RuleState::WaitLocal);

    // Second run only performs the remaining stage
    h.dns_agent.faults.clear();
    let mut task = Task::load(&h.ctx(), APP_NAME, APP, "t1").await.unwrap();
    task.process_dns_rules_apply().await.unwrap();
    assert_eq!(h.data_plane.log.count("mp2_add_dns"), 1);
    assert_eq!(h.dns_agent.log.count("local_set"), 2);

    // Third run has nothing left to do
    h.clear_calls();
    let mut task = Task::load(&h.ctx(), APP_NAME, APP, "t1").await.unwrap();
    task.process_dns_rules_apply().await.unwrap();
    assert_eq!(h.remote_ops(), (vec![], vec![]));
    assert_eq!(h.status("t1").await.progress, 1);
}

#[tokio::test]
async fn progress_increases_once_per_rule() {
    let h = Harness::new(DnsAgentMode::All);
    h.stage(
        "t1",
        job(
            Operation::Create,
            vec![
                dns_rule("d1", "a.example.com", RuleActivation::Active),
                dns_rule("d2", "b.example.com", RuleActivation::Inactive),
            ],
            vec![traffic_rule("r1", 1, RuleActivation::Active)],
        ),
    )
    .await;

    let mut task = Task::load(&h.ctx(), APP_NAME, APP, "t1").await.unwrap();
    task.process_dns_rules_apply().await.unwrap();
    task.process_traffic_rules_apply().await.unwrap();

    // Staging write, then per DNS rule two state writes, then one for traffic
    assert_eq!(h.progress_history("t1"), vec![0, 0, 1, 1, 2, 3]);

    let status = h.status("t1").await;
    assert_eq!(status.progress, status.total_rules());
    assert!(
        status
            .dns_rule_status_lst
            .iter()
            .chain(&status.traffic_rule_status_lst)
            .all(|s| s.state == RuleState::WaitConfigDbWrite)
    );
}

#[tokio::test]
async fn revert_walks_completed_stages_backwards() {
    let h = Harness::new(DnsAgentMode::All);
    h.stage(
        "t1",
        job(
            Operation::Create,
            vec![dns_rule("d1", "example.com", RuleActivation::Active)],
            vec![traffic_rule("r1", 1, RuleActivation::Active)],
        ),
    )
    .await;
    h.data_plane.faults.fail_on("mp2_add_traffic");

    let mut task = Task::load(&h.ctx(), APP_NAME, APP, "t1").await.unwrap();
    task.process_dns_rules_apply().await.unwrap();
    assert!(task.process_traffic_rules_apply().await.is_err());
    assert_eq!(task.status().progress, 1);

    h.clear_calls();
    task.revert_dns_rules().await;
    task.revert_traffic_rules().await;

    // Local stage undone before the Mp2 stage; the failed traffic stage is skipped
    assert_eq!(h.dns_agent.log.ops(), vec!["local_delete"]);
    assert_eq!(h.data_plane.log.ops(), vec!["mp2_delete_dns"]);

    let status = h.status("t1").await;
    assert_eq!(status.progress, 0);
    assert_eq!(status.dns_rule_status_lst[0].state, RuleState::WaitMp2);
    assert_eq!(status.traffic_rule_status_lst[0].state, RuleState::WaitMp2);

    // Nothing left to revert
    h.clear_calls();
    task.revert_dns_rules().await;
    assert_eq!(h.remote_ops(), (vec![], vec![]));
}

#[tokio::test]
async fn skipped_stages_still_advance_state() {
    let h = Harness::new(DnsAgentMode::Local);
    h.stage(
        "t1",
        job(
            Operation::Create,
            vec![dns_rule("d1", "example.com", RuleActivation::Active)],
            vec![],
        ),
    )
    .await;

    let mut task = Task::load(&h.ctx(), APP_NAME, APP, "t1").await.unwrap();
    task.process_dns_rules_apply().await.unwrap();

    assert!(h.data_plane.log.ops().is_empty());
    assert_eq!(h.dns_agent.log.ops(), vec!["local_set"]);
    assert_eq!(task.status().progress, 1);
}

#[tokio::test]
async fn failed_status_write_rolls_back_memory() {
    let h = Harness::new(DnsAgentMode::All);
    h.stage(
        "t1",
        job(
            Operation::Create,
            vec![dns_rule("d1", "example.com", RuleActivation::Active)],
            vec![],
        ),
    )
    .await;

    // The write to WaitLocal succeeds, the one to the terminal state fails
    h.store.fail_puts("taskstatus", 1);
    let mut task = Task::load(&h.ctx(), APP_NAME, APP, "t1").await.unwrap();
    let err = task.process_dns_rules_apply().await.unwrap_err();
    assert_eq!(err.store_code(), Some(2));

    assert_eq!(task.status().progress, 0);
    assert_eq!(task.status().dns_rule_status_lst[0].state, RuleState::WaitLocal);
    assert_eq!(task.status(), &h.status("t1").await);
}
