//! Rule lookup for a task
//!
//! Every rule id named by a status entry must resolve on both sides of a
//! stage: what to apply and what is there now. Rules only present in the job
//! (creates) are mirrored into the store side, rules only present in the store
//! (deletes) into the job side.

use std::collections::HashMap;

use crate::model::Rule;
use crate::task::status_db::{Method, RuleStatus};

/// Job and store copies of one rule kind, keyed by rule id
#[derive(Debug, Clone)]
pub struct RuleMaps<R> {
    job: HashMap<String, R>,
    store: HashMap<String, R>,
}

impl<R: Rule> RuleMaps<R> {
    pub fn build(job_rules: &[R], store_rules: &[R], statuses: &[RuleStatus]) -> Self {
        let mut job: HashMap<String, R> = job_rules
            .iter()
            .map(|r| (r.id().to_string(), r.clone()))
            .collect();
        let mut store: HashMap<String, R> = store_rules
            .iter()
            .map(|r| (r.id().to_string(), r.clone()))
            .collect();

        for status in statuses {
            match status.method {
                Method::Create if !store.contains_key(&status.id) => {
                    if let Some(rule) = job.get(&status.id) {
                        store.insert(status.id.clone(), rule.clone());
                    }
                }
                Method::Delete if !job.contains_key(&status.id) => {
                    if let Some(rule) = store.get(&status.id) {
                        job.insert(status.id.clone(), rule.clone());
                    }
                }
                _ => {}
            }
        }

        Self { job, store }
    }

    /// Rule to apply
    pub fn apply_new(&self, id: &str) -> Option<&R> {
        self.job.get(id)
    }

    /// Rule currently in place before applying
    pub fn apply_old(&self, id: &str) -> Option<&R> {
        self.store.get(id)
    }

    /// Rule to restore when reverting
    pub fn revert_target(&self, id: &str) -> Option<&R> {
        self.store.get(id)
    }

    /// Rule in place when reverting
    pub fn revert_current(&self, id: &str) -> Option<&R> {
        self.job.get(id)
    }
}
