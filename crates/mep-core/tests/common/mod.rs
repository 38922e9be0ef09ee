//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal test doubles that record every remote call
//! and can be told to fail (or panic) on a given call.

#![allow(dead_code)]

use async_trait::async_trait;
use mep_core::config::DnsAgentMode;
use mep_core::error::{Error, Result};
use mep_core::model::{
    AppDConfig, AppInfo, DnsRule, Operation, RuleActivation, TrafficRule,
};
use mep_core::paths::KeyPaths;
use mep_core::store::MemoryRuleStore;
use mep_core::task::{self, TaskContext, TaskStatus};
use mep_core::traits::{DataPlane, DnsAgent, RuleStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Shared log of remote calls, e.g. `("mp2_add_dns", "d1")`
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl CallLog {
    fn push(&self, op: &str, subject: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((op.to_string(), subject.to_string()));
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Only the operation names, in call order
    pub fn ops(&self) -> Vec<String> {
        self.calls().into_iter().map(|(op, _)| op).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|(o, _)| o == op).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// Pauses a named operation until released
#[derive(Clone, Default)]
pub struct Gate {
    /// Notified once the operation is waiting
    pub entered: Arc<Notify>,
    /// Lets the waiting operation continue
    pub release: Arc<Notify>,
}

/// What to do when a named operation is called
#[derive(Clone, Default)]
pub struct Faults {
    fail: Arc<Mutex<Vec<String>>>,
    panic: Arc<Mutex<Vec<String>>>,
    hold: Arc<Mutex<Option<(String, Gate)>>>,
}

impl Faults {
    /// Pause the next call of `op` until the returned gate is released
    pub fn hold_on(&self, op: &str) -> Gate {
        let gate = Gate::default();
        *self.hold.lock().unwrap() = Some((op.to_string(), gate.clone()));
        gate
    }

    async fn pause(&self, op: &str) {
        let gate = {
            let mut hold = self.hold.lock().unwrap();
            match hold.as_ref() {
                Some((held, _)) if held == op => hold.take().map(|(_, gate)| gate),
                _ => None,
            }
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }

    pub fn fail_on(&self, op: &str) {
        self.fail.lock().unwrap().push(op.to_string());
    }

    pub fn panic_on(&self, op: &str) {
        self.panic.lock().unwrap().push(op.to_string());
    }

    pub fn clear(&self) {
        self.fail.lock().unwrap().clear();
        self.panic.lock().unwrap().clear();
    }

    fn check(&self, op: &str) -> bool {
        if self.panic.lock().unwrap().iter().any(|o| o == op) {
            panic!("injected panic in {}", op);
        }
        self.fail.lock().unwrap().iter().any(|o| o == op)
    }
}

/// DNS agent that records `local_set` / `local_delete` calls by host
#[derive(Clone, Default)]
pub struct RecordingDnsAgent {
    pub log: CallLog,
    pub faults: Faults,
}

#[async_trait]
impl DnsAgent for RecordingDnsAgent {
    async fn set_resource_record_type_a(
        &self,
        host: &str,
        _rr_type: &str,
        _class: &str,
        _point_to: &[String],
        _ttl: u32,
    ) -> Result<()> {
        self.log.push("local_set", host);
        self.faults.pause("local_set").await;
        if self.faults.check("local_set") {
            return Err(Error::dns_agent("injected failure"));
        }
        Ok(())
    }

    async fn delete_resource_record_type_a(&self, host: &str, _rr_type: &str) -> Result<()> {
        self.log.push("local_delete", host);
        if self.faults.check("local_delete") {
            return Err(Error::dns_agent("injected failure"));
        }
        Ok(())
    }

    fn agent_name(&self) -> &'static str {
        "recording"
    }
}

/// Data plane that records `mp2_*` calls by rule id
#[derive(Clone, Default)]
pub struct RecordingDataPlane {
    pub log: CallLog,
    pub faults: Faults,
}

impl RecordingDataPlane {
    fn call(&self, op: &str, rule_id: &str) -> Result<()> {
        self.log.push(op, rule_id);
        if self.faults.check(op) {
            return Err(Error::data_plane("injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl DataPlane for RecordingDataPlane {
    async fn init_data_plane(&self, _config: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn add_dns_rule(&self, _app: &AppInfo, rule: &DnsRule) -> Result<()> {
        self.call("mp2_add_dns", &rule.dns_rule_id)
    }

    async fn set_dns_rule(&self, _app: &AppInfo, rule: &DnsRule) -> Result<()> {
        self.call("mp2_set_dns", &rule.dns_rule_id)
    }

    async fn delete_dns_rule(&self, _app: &AppInfo, rule: &DnsRule) -> Result<()> {
        self.call("mp2_delete_dns", &rule.dns_rule_id)
    }

    async fn add_traffic_rule(&self, _app: &AppInfo, rule: &TrafficRule) -> Result<()> {
        self.call("mp2_add_traffic", &rule.traffic_rule_id)
    }

    async fn set_traffic_rule(&self, _app: &AppInfo, rule: &TrafficRule) -> Result<()> {
        self.call("mp2_set_traffic", &rule.traffic_rule_id)
    }

    async fn delete_traffic_rule(&self, _app: &AppInfo, rule_id: &str) -> Result<()> {
        self.call("mp2_delete_traffic", rule_id)
    }

    fn data_plane_name(&self) -> &'static str {
        "recording"
    }
}

/// Memory store whose writes can be made to fail
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryRuleStore,
    fail_puts_containing: Arc<Mutex<Option<String>>>,
    fail_deletes_containing: Arc<Mutex<Option<String>>>,
    /// Successful puts before failing starts
    puts_before_failure: Arc<AtomicUsize>,
    pub put_count: Arc<AtomicUsize>,
    history: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl FlakyStore {
    /// Fail every put whose path contains `fragment`, after `skip` more
    /// successful ones
    pub fn fail_puts(&self, fragment: &str, skip: usize) {
        *self.fail_puts_containing.lock().unwrap() = Some(fragment.to_string());
        self.puts_before_failure.store(skip, Ordering::SeqCst);
    }

    /// Fail every delete whose path contains `fragment`
    pub fn fail_deletes(&self, fragment: &str) {
        *self.fail_deletes_containing.lock().unwrap() = Some(fragment.to_string());
    }

    pub fn heal(&self) {
        *self.fail_puts_containing.lock().unwrap() = None;
        *self.fail_deletes_containing.lock().unwrap() = None;
    }

    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    /// Every successful write to `path`, oldest first
    pub fn writes_to(&self, path: &str) -> Vec<Vec<u8>> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[async_trait]
impl RuleStore for FlakyStore {
    async fn get_record(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.get_record(path).await
    }

    async fn put_record(&self, path: &str, value: &[u8]) -> Result<()> {
        let armed = self
            .fail_puts_containing
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|fragment| path.contains(fragment.as_str()));
        if armed {
            let remaining = self.puts_before_failure.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(Error::store(2, format!("injected write failure at {}", path)));
            }
            self.puts_before_failure.store(remaining - 1, Ordering::SeqCst);
        }
        self.put_count.fetch_add(1, Ordering::SeqCst);
        self.history
            .lock()
            .unwrap()
            .push((path.to_string(), value.to_vec()));
        self.inner.put_record(path, value).await
    }

    async fn delete_record(&self, path: &str) -> Result<()> {
        let armed = self
            .fail_deletes_containing
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|fragment| path.contains(fragment.as_str()));
        if armed {
            return Err(Error::store(3, format!("injected delete failure at {}", path)));
        }
        self.inner.delete_record(path).await
    }

    async fn list_paths(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list_paths(prefix).await
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Store, doubles and paths of one test
pub struct Harness {
    pub store: FlakyStore,
    pub dns_agent: RecordingDnsAgent,
    pub data_plane: RecordingDataPlane,
    pub paths: KeyPaths,
    pub mode: DnsAgentMode,
}

pub const APP: &str = "app-1";
pub const APP_NAME: &str = "demo";

impl Harness {
    pub fn new(mode: DnsAgentMode) -> Self {
        Self {
            store: FlakyStore::default(),
            dns_agent: RecordingDnsAgent::default(),
            data_plane: RecordingDataPlane::default(),
            paths: KeyPaths::default(),
            mode,
        }
    }

    pub fn ctx(&self) -> TaskContext {
        TaskContext {
            store: Arc::new(self.store.clone()),
            dns_agent: Arc::new(self.dns_agent.clone()),
            data_plane: Arc::new(self.data_plane.clone()),
            dns_mode: self.mode,
            paths: self.paths.clone(),
        }
    }

    /// Data plane and DNS agent calls, in order
    pub fn remote_ops(&self) -> (Vec<String>, Vec<String>) {
        (self.data_plane.log.ops(), self.dns_agent.log.ops())
    }

    pub fn clear_calls(&self) {
        self.data_plane.log.clear();
        self.dns_agent.log.clear();
    }

    /// Write `config` as the applied config of [`APP`]
    pub async fn seed_config(&self, config: AppDConfig) {
        task::AppDConfigDb::new(Arc::new(self.store.clone()), &self.paths, APP)
            .put(&config)
            .await
            .unwrap();
    }

    pub async fn stage(&self, task_id: &str, job: AppDConfig) -> TaskStatus {
        task::stage_job(Arc::new(self.store.clone()), &self.paths, APP, task_id, &job)
            .await
            .unwrap()
    }

    /// Progress values in the order they were written
    pub fn progress_history(&self, task_id: &str) -> Vec<i32> {
        self.store
            .writes_to(&self.paths.task_status(APP, task_id))
            .iter()
            .map(|bytes| serde_json::from_slice::<TaskStatus>(bytes).unwrap().progress)
            .collect()
    }

    pub async fn status(&self, task_id: &str) -> TaskStatus {
        let bytes = self
            .store
            .get_record(&self.paths.task_status(APP, task_id))
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub async fn stored_config(&self) -> Option<AppDConfig> {
        task::AppDConfigDb::new(Arc::new(self.store.clone()), &self.paths, APP)
            .get()
            .await
            .unwrap()
    }

    pub async fn job_exists(&self) -> bool {
        task::is_any_ongoing_operation_exist(Arc::new(self.store.clone()), &self.paths, APP)
            .await
            .unwrap()
    }
}

pub fn dns_rule(id: &str, domain: &str, state: RuleActivation) -> DnsRule {
    DnsRule {
        dns_rule_id: id.to_string(),
        domain_name: domain.to_string(),
        ip_address_type: Default::default(),
        ip_address: "10.0.0.5".to_string(),
        ttl: 30,
        state,
    }
}

pub fn traffic_rule(id: &str, priority: u32, state: RuleActivation) -> TrafficRule {
    TrafficRule {
        traffic_rule_id: id.to_string(),
        filter_type: Default::default(),
        priority,
        traffic_filter: vec![],
        action: Default::default(),
        dst_interface: vec![],
        state,
    }
}

pub fn job(operation: Operation, dns: Vec<DnsRule>, traffic: Vec<TrafficRule>) -> AppDConfig {
    AppDConfig {
        app_traffic_rule: traffic,
        app_dns_rule: dns,
        app_support_mp1: true,
        app_name: APP_NAME.to_string(),
        operation: Some(operation),
    }
}
