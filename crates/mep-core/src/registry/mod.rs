//! Plugin-based component registry
//!
//! The registry allows data planes, DNS agents and rule stores to be
//! registered by type name at startup, avoiding hardcoded if-else chains in
//! the daemon.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mep_core::registry::PluginRegistry;
//!
//! let registry = PluginRegistry::with_builtins();
//! mep_dns_agent::register(&registry);
//!
//! let store = registry.create_rule_store(&config.store).await?;
//! let dns_agent = registry.create_dns_agent(&config.dns_agent.backend)?;
//! let data_plane = registry.create_data_plane(&config.data_plane)?;
//! ```

use crate::config::{DataPlaneConfig, DnsAgentBackend, RuleStoreConfig};
use crate::dataplane::NoneDataPlaneFactory;
use crate::error::{Error, Result};
use crate::store::{FileRuleStoreFactory, MemoryRuleStoreFactory};
use crate::traits::{DataPlane, DnsAgent, RuleStore};
use crate::traits::{DataPlaneFactory, DnsAgentFactory, RuleStoreFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry of component factories keyed by type name
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct PluginRegistry {
    /// Registered data plane factories
    data_planes: RwLock<HashMap<String, Box<dyn DataPlaneFactory>>>,

    /// Registered DNS agent factories
    dns_agents: RwLock<HashMap<String, Box<dyn DnsAgentFactory>>>,

    /// Registered rule store factories
    rule_stores: RwLock<HashMap<String, Arc<dyn RuleStoreFactory>>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `none` data plane and the
    /// `memory` / `file` rule stores registered
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_data_plane("none", Box::new(NoneDataPlaneFactory));
        registry.register_rule_store("memory", Box::new(MemoryRuleStoreFactory));
        registry.register_rule_store("file", Box::new(FileRuleStoreFactory));
        registry
    }

    /// Register a data plane factory
    pub fn register_data_plane(&self, name: impl Into<String>, factory: Box<dyn DataPlaneFactory>) {
        let mut data_planes = self.data_planes.write().unwrap_or_else(PoisonError::into_inner);
        data_planes.insert(name.into(), factory);
    }

    /// Register a DNS agent factory
    pub fn register_dns_agent(&self, name: impl Into<String>, factory: Box<dyn DnsAgentFactory>) {
        let mut dns_agents = self.dns_agents.write().unwrap_or_else(PoisonError::into_inner);
        dns_agents.insert(name.into(), factory);
    }

    /// Register a rule store factory
    pub fn register_rule_store(&self, name: impl Into<String>, factory: Box<dyn RuleStoreFactory>) {
        let mut stores = self.rule_stores.write().unwrap_or_else(PoisonError::into_inner);
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Create a data plane from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DataPlane>)`: Created data plane instance
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub fn create_data_plane(&self, config: &DataPlaneConfig) -> Result<Box<dyn DataPlane>> {
        let type_name = config.type_name();
        let data_planes = self.data_planes.read().unwrap_or_else(PoisonError::into_inner);

        let factory = data_planes
            .get(type_name)
            .ok_or_else(|| Error::config(format!("Unknown data plane type: {}", type_name)))?;

        factory.create(config)
    }

    /// Create a DNS agent from configuration
    pub fn create_dns_agent(&self, config: &DnsAgentBackend) -> Result<Box<dyn DnsAgent>> {
        let type_name = config.type_name();
        let dns_agents = self.dns_agents.read().unwrap_or_else(PoisonError::into_inner);

        let factory = dns_agents
            .get(type_name)
            .ok_or_else(|| Error::config(format!("Unknown DNS agent type: {}", type_name)))?;

        factory.create(config)
    }

    /// Create a rule store from configuration
    pub async fn create_rule_store(&self, config: &RuleStoreConfig) -> Result<Box<dyn RuleStore>> {
        let type_name = config.type_name();

        let factory = {
            let stores = self.rule_stores.read().unwrap_or_else(PoisonError::into_inner);
            stores
                .get(type_name)
                .ok_or_else(|| Error::config(format!("Unknown rule store type: {}", type_name)))?
                .clone()
        };

        let config_json = serde_json::to_value(config)?;
        factory.create(&config_json).await
    }

    /// Check if a data plane type is registered
    pub fn has_data_plane(&self, name: &str) -> bool {
        let data_planes = self.data_planes.read().unwrap_or_else(PoisonError::into_inner);
        data_planes.contains_key(name)
    }

    /// Check if a DNS agent type is registered
    pub fn has_dns_agent(&self, name: &str) -> bool {
        let dns_agents = self.dns_agents.read().unwrap_or_else(PoisonError::into_inner);
        dns_agents.contains_key(name)
    }

    /// Check if a rule store type is registered
    pub fn has_rule_store(&self, name: &str) -> bool {
        let stores = self.rule_stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.contains_key(name)
    }
}
