//! Per-rule state machine
//!
//! A [`DispatchTable`] maps `(Method, RuleState)` to the [`Transition`] taken
//! from that state: which remote endpoint to touch (if any) and the state
//! reached on success. A cell without an endpoint is a stage skipped under
//! the configured DNS agent mode; the rule still moves through it.
//!
//! The remote calls themselves go through [`RulePrimitives`], so the same
//! create/modify/delete policy drives DNS and traffic rules.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::DnsAgentMode;
use crate::error::{Error, Result};
use crate::model::{AppInfo, DnsRule, Rule, RuleKind, TrafficRule};
use crate::task::status_db::{Method, RuleState};
use crate::traits::{DataPlane, DnsAgent};

/// DNS class used for every local resource record
const DNS_CLASS_IN: &str = "IN";

/// Remote side of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The data plane (Mp2)
    Mp2,
    /// The local DNS server
    Local,
}

/// Add/set/delete calls for one rule kind
#[async_trait]
pub trait RulePrimitives<R: Rule>: Send + Sync {
    async fn add(&self, endpoint: Endpoint, rule: &R) -> Result<()>;

    async fn set(&self, endpoint: Endpoint, rule: &R) -> Result<()>;

    async fn delete(&self, endpoint: Endpoint, rule: &R) -> Result<()>;
}

/// Operation run by a table cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOp {
    pub endpoint: Endpoint,
    pub method: Method,
}

impl StageOp {
    /// Move the remote side from `old` to `new`
    pub async fn apply<R, P>(
        &self,
        prims: &P,
        rule_id: &str,
        new: Option<&R>,
        old: Option<&R>,
    ) -> Result<()>
    where
        R: Rule,
        P: RulePrimitives<R> + ?Sized,
    {
        debug!("apply {:?} {} rule {} on {:?}", self.method, R::KIND, rule_id, self.endpoint);
        match self.method {
            Method::Create => {
                let rule = new.ok_or_else(|| {
                    Error::consistency(format!("{} rule {} missing from job", R::KIND, rule_id))
                })?;
                if rule.is_active() {
                    prims.add(self.endpoint, rule).await?;
                }
                Ok(())
            }
            Method::Modify => {
                let old = old.ok_or_else(Error::existing_rule_expected)?;
                let new = new.ok_or_else(Error::existing_rule_expected)?;
                modify(prims, self.endpoint, new, old).await
            }
            Method::Delete => {
                let old = old.ok_or_else(Error::existing_rule_expected)?;
                if old.is_active() {
                    prims.delete(self.endpoint, old).await?;
                }
                Ok(())
            }
        }
    }

    /// Undo [`StageOp::apply`]: move the remote side from `current` back to `target`
    pub async fn revert<R, P>(
        &self,
        prims: &P,
        rule_id: &str,
        target: Option<&R>,
        current: Option<&R>,
    ) -> Result<()>
    where
        R: Rule,
        P: RulePrimitives<R> + ?Sized,
    {
        debug!("revert {:?} {} rule {} on {:?}", self.method, R::KIND, rule_id, self.endpoint);
        match self.method {
            Method::Create => {
                let created = current.or(target).ok_or_else(|| {
                    Error::consistency(format!("{} rule {} missing from job", R::KIND, rule_id))
                })?;
                prims.delete(self.endpoint, created).await
            }
            Method::Modify => {
                let target = target.ok_or_else(Error::existing_rule_expected)?;
                let current = current.ok_or_else(Error::existing_rule_expected)?;
                modify(prims, self.endpoint, target, current).await
            }
            Method::Delete => {
                let target = target.ok_or_else(Error::existing_rule_expected)?;
                prims.add(self.endpoint, target).await
            }
        }
    }
}

/// Replace `old` by `new` on one endpoint according to their activation
async fn modify<R, P>(prims: &P, endpoint: Endpoint, new: &R, old: &R) -> Result<()>
where
    R: Rule,
    P: RulePrimitives<R> + ?Sized,
{
    match (old.is_active(), new.is_active()) {
        (false, true) => prims.add(endpoint, new).await,
        (true, false) => prims.delete(endpoint, old).await,
        // Activation unchanged: update in place
        _ => prims.set(endpoint, new).await,
    }
}

/// Cell of a dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// `None` when the stage is skipped
    pub op: Option<StageOp>,
    pub next: RuleState,
}

/// `(Method, RuleState) -> Transition` table of one rule kind
#[derive(Debug, Clone)]
pub struct DispatchTable {
    kind: RuleKind,
    stages: Vec<RuleState>,
    cells: HashMap<(Method, RuleState), Transition>,
}

impl DispatchTable {
    /// DNS rules: `WaitMp2 -> WaitLocal -> WaitConfigDBWrite`
    ///
    /// The Mp2 stage only acts when the mode uses the data plane, the local
    /// stage only when it uses the local DNS server.
    pub fn dns(mode: DnsAgentMode) -> Self {
        let endpoint_of = |state: RuleState| match state {
            RuleState::WaitMp2 if mode.uses_data_plane() => Some(Endpoint::Mp2),
            RuleState::WaitLocal if mode.uses_local() => Some(Endpoint::Local),
            _ => None,
        };
        Self::build(
            RuleKind::Dns,
            vec![RuleState::WaitMp2, RuleState::WaitLocal, RuleState::WaitConfigDbWrite],
            endpoint_of,
        )
    }

    /// Traffic rules: `WaitMp2 -> WaitConfigDBWrite`
    pub fn traffic() -> Self {
        Self::build(
            RuleKind::Traffic,
            vec![RuleState::WaitMp2, RuleState::WaitConfigDbWrite],
            |state| (state == RuleState::WaitMp2).then_some(Endpoint::Mp2),
        )
    }

    fn build(
        kind: RuleKind,
        stages: Vec<RuleState>,
        endpoint_of: impl Fn(RuleState) -> Option<Endpoint>,
    ) -> Self {
        let mut cells = HashMap::new();
        for method in [Method::Create, Method::Modify, Method::Delete] {
            for pair in stages.windows(2) {
                let op = endpoint_of(pair[0]).map(|endpoint| StageOp { endpoint, method });
                cells.insert((method, pair[0]), Transition { op, next: pair[1] });
            }
        }
        Self { kind, stages, cells }
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// Transition out of `state`; `None` for the terminal state and for
    /// states this kind never visits
    pub fn transition(&self, method: Method, state: RuleState) -> Option<Transition> {
        self.cells.get(&(method, state)).copied()
    }

    pub fn first_state(&self) -> RuleState {
        self.stages[0]
    }

    pub fn terminal_state(&self) -> RuleState {
        self.stages[self.stages.len() - 1]
    }

    /// The stage before `state`
    pub fn previous_state(&self, state: RuleState) -> Option<RuleState> {
        let index = self.stages.iter().position(|s| *s == state)?;
        index.checked_sub(1).map(|i| self.stages[i])
    }
}

/// Remote collaborators of one application instance
#[derive(Clone)]
pub struct RemoteTargets {
    pub app: AppInfo,
    pub dns_agent: Arc<dyn DnsAgent>,
    pub data_plane: Arc<dyn DataPlane>,
}

#[async_trait]
impl RulePrimitives<DnsRule> for RemoteTargets {
    async fn add(&self, endpoint: Endpoint, rule: &DnsRule) -> Result<()> {
        match endpoint {
            Endpoint::Mp2 => self.data_plane.add_dns_rule(&self.app, rule).await,
            Endpoint::Local => self.set_local_record(rule).await,
        }
    }

    async fn set(&self, endpoint: Endpoint, rule: &DnsRule) -> Result<()> {
        match endpoint {
            Endpoint::Mp2 => self.data_plane.set_dns_rule(&self.app, rule).await,
            Endpoint::Local => self.set_local_record(rule).await,
        }
    }

    async fn delete(&self, endpoint: Endpoint, rule: &DnsRule) -> Result<()> {
        match endpoint {
            Endpoint::Mp2 => self.data_plane.delete_dns_rule(&self.app, rule).await,
            Endpoint::Local => {
                self.dns_agent
                    .delete_resource_record_type_a(
                        &rule.domain_name,
                        rule.ip_address_type.rr_type(),
                    )
                    .await
            }
        }
    }
}

#[async_trait]
impl RulePrimitives<TrafficRule> for RemoteTargets {
    async fn add(&self, endpoint: Endpoint, rule: &TrafficRule) -> Result<()> {
        Self::traffic_endpoint(endpoint)?;
        self.data_plane.add_traffic_rule(&self.app, rule).await
    }

    async fn set(&self, endpoint: Endpoint, rule: &TrafficRule) -> Result<()> {
        Self::traffic_endpoint(endpoint)?;
        self.data_plane.set_traffic_rule(&self.app, rule).await
    }

    async fn delete(&self, endpoint: Endpoint, rule: &TrafficRule) -> Result<()> {
        Self::traffic_endpoint(endpoint)?;
        self.data_plane
            .delete_traffic_rule(&self.app, &rule.traffic_rule_id)
            .await
    }
}

impl RemoteTargets {
    async fn set_local_record(&self, rule: &DnsRule) -> Result<()> {
        self.dns_agent
            .set_resource_record_type_a(
                &rule.domain_name,
                rule.ip_address_type.rr_type(),
                DNS_CLASS_IN,
                std::slice::from_ref(&rule.ip_address),
                rule.ttl,
            )
            .await
    }

    fn traffic_endpoint(endpoint: Endpoint) -> Result<()> {
        match endpoint {
            Endpoint::Mp2 => Ok(()),
            Endpoint::Local => Err(Error::consistency("traffic rules have no local stage")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RuleActivation;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(&'static str, Endpoint, String)>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<(&'static str, Endpoint, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, op: &'static str, endpoint: Endpoint, rule: &DnsRule) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((op, endpoint, rule.domain_name.clone()));
            Ok(())
        }
    }

    #[async_trait]
    impl RulePrimitives<DnsRule> for Recorder {
        async fn add(&self, endpoint: Endpoint, rule: &DnsRule) -> Result<()> {
            self.record("add", endpoint, rule)
        }

        async fn set(&self, endpoint: Endpoint, rule: &DnsRule) -> Result<()> {
            self.record("set", endpoint, rule)
        }

        async fn delete(&self, endpoint: Endpoint, rule: &DnsRule) -> Result<()> {
            self.record("delete", endpoint, rule)
        }
    }

    fn rule(domain: &str, state: RuleActivation) -> DnsRule {
        DnsRule {
            dns_rule_id: "r1".to_string(),
            domain_name: domain.to_string(),
            ip_address_type: Default::default(),
            ip_address: "10.0.0.1".to_string(),
            ttl: 30,
            state,
        }
    }

    fn op(method: Method) -> StageOp {
        StageOp {
            endpoint: Endpoint::Mp2,
            method,
        }
    }

    #[test]
    fn dns_table_follows_agent_mode() {
        let all = DispatchTable::dns(DnsAgentMode::All);
        let t = all.transition(Method::Create, RuleState::WaitMp2).unwrap();
        assert_eq!(t.op.map(|o| o.endpoint), Some(Endpoint::Mp2));
        assert_eq!(t.next, RuleState::WaitLocal);
        let t = all.transition(Method::Create, RuleState::WaitLocal).unwrap();
        assert_eq!(t.op.map(|o| o.endpoint), Some(Endpoint::Local));
        assert_eq!(t.next, RuleState::WaitConfigDbWrite);
        assert!(all.transition(Method::Create, RuleState::WaitConfigDbWrite).is_none());

        let local = DispatchTable::dns(DnsAgentMode::Local);
        assert!(local.transition(Method::Delete, RuleState::WaitMp2).unwrap().op.is_none());
        assert!(local.transition(Method::Delete, RuleState::WaitLocal).unwrap().op.is_some());

        let dataplane = DispatchTable::dns(DnsAgentMode::Dataplane);
        assert!(dataplane.transition(Method::Modify, RuleState::WaitMp2).unwrap().op.is_some());
        assert!(dataplane.transition(Method::Modify, RuleState::WaitLocal).unwrap().op.is_none());
    }

    #[test]
    fn traffic_table_skips_local_stage() {
        let table = DispatchTable::traffic();
        assert_eq!(table.first_state(), RuleState::WaitMp2);
        assert_eq!(table.terminal_state(), RuleState::WaitConfigDbWrite);
        assert_eq!(
            table.transition(Method::Create, RuleState::WaitMp2).unwrap().next,
            RuleState::WaitConfigDbWrite
        );
        assert!(table.transition(Method::Create, RuleState::WaitLocal).is_none());
        assert_eq!(
            table.previous_state(RuleState::WaitConfigDbWrite),
            Some(RuleState::WaitMp2)
        );
        assert_eq!(table.previous_state(RuleState::WaitMp2), None);
        assert_eq!(table.previous_state(RuleState::WaitLocal), None);
    }

    #[tokio::test]
    async fn create_inactive_is_noop() {
        let rec = Recorder::default();
        let inactive = rule("a.example.com", RuleActivation::Inactive);
        op(Method::Create)
            .apply(&rec, "r1", Some(&inactive), Some(&inactive))
            .await
            .unwrap();
        assert!(rec.calls().is_empty());
    }

    #[tokio::test]
    async fn create_revert_always_deletes() {
        let rec = Recorder::default();
        let inactive = rule("a.example.com", RuleActivation::Inactive);
        op(Method::Create)
            .revert(&rec, "r1", None, Some(&inactive))
            .await
            .unwrap();
        assert_eq!(
            rec.calls(),
            vec![("delete", Endpoint::Mp2, "a.example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn delete_inactive_is_noop() {
        let rec = Recorder::default();
        let inactive = rule("a.example.com", RuleActivation::Inactive);
        op(Method::Delete)
            .apply(&rec, "r1", Some(&inactive), Some(&inactive))
            .await
            .unwrap();
        assert!(rec.calls().is_empty());

        // Revert restores the stored record as it was
        op(Method::Delete)
            .revert(&rec, "r1", Some(&inactive), Some(&inactive))
            .await
            .unwrap();
        assert_eq!(
            rec.calls(),
            vec![("add", Endpoint::Mp2, "a.example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn modify_policy() {
        let rec = Recorder::default();
        let active = rule("on.example.com", RuleActivation::Active);
        let inactive = rule("off.example.com", RuleActivation::Inactive);
        let changed = rule("moved.example.com", RuleActivation::Active);

        let modify = op(Method::Modify);
        modify.apply(&rec, "r1", Some(&active), Some(&inactive)).await.unwrap();
        modify.apply(&rec, "r1", Some(&inactive), Some(&active)).await.unwrap();
        modify.apply(&rec, "r1", Some(&changed), Some(&active)).await.unwrap();
        modify.apply(&rec, "r1", Some(&inactive), Some(&inactive)).await.unwrap();

        assert_eq!(
            rec.calls(),
            vec![
                ("add", Endpoint::Mp2, "on.example.com".to_string()),
                ("delete", Endpoint::Mp2, "on.example.com".to_string()),
                ("set", Endpoint::Mp2, "moved.example.com".to_string()),
                ("set", Endpoint::Mp2, "off.example.com".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn modify_between_inactive_rules_sets() {
        let rec = Recorder::default();
        let old = DnsRule {
            ip_address: "1.1.1.1".to_string(),
            ..rule("a.example.com", RuleActivation::Inactive)
        };
        let new = DnsRule {
            ip_address: "2.2.2.2".to_string(),
            ..rule("a.example.com", RuleActivation::Inactive)
        };

        op(Method::Modify).apply(&rec, "r1", Some(&new), Some(&old)).await.unwrap();
        op(Method::Modify).revert(&rec, "r1", Some(&old), Some(&new)).await.unwrap();

        assert_eq!(
            rec.calls(),
            vec![
                ("set", Endpoint::Mp2, "a.example.com".to_string()),
                ("set", Endpoint::Mp2, "a.example.com".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn revert_inverts_apply() {
        let rec = Recorder::default();
        let stored = rule("old.example.com", RuleActivation::Active);
        let job = rule("new.example.com", RuleActivation::Active);

        op(Method::Create).revert(&rec, "r1", None, Some(&job)).await.unwrap();
        op(Method::Modify)
            .revert(&rec, "r1", Some(&stored), Some(&job))
            .await
            .unwrap();
        op(Method::Delete)
            .revert(&rec, "r1", Some(&stored), Some(&stored))
            .await
            .unwrap();

        assert_eq!(
            rec.calls(),
            vec![
                ("delete", Endpoint::Mp2, "new.example.com".to_string()),
                ("set", Endpoint::Mp2, "old.example.com".to_string()),
                ("add", Endpoint::Mp2, "old.example.com".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn missing_existing_rule_is_consistency_error() {
        let rec = Recorder::default();
        let job = rule("new.example.com", RuleActivation::Active);

        let err = op(Method::Delete)
            .apply::<DnsRule, _>(&rec, "r1", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "existing rule expected");

        let err = op(Method::Modify)
            .apply(&rec, "r1", Some(&job), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "existing rule expected");

        let err = op(Method::Delete)
            .revert::<DnsRule, _>(&rec, "r1", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "existing rule expected");
        assert!(rec.calls().is_empty());
    }
}
