// # Data Plane Trait
//
// Defines the interface to the data plane (Mp2) that realizes DNS and
// traffic rules for application instances.
//
// ## Implementations
//
// - None: `NoneDataPlane`, accepts everything without effect
// - Vendor plugins register a `DataPlaneFactory` with the registry

use async_trait::async_trait;

use crate::model::{AppInfo, DnsRule, TrafficRule};

/// Trait for data plane implementations
///
/// Every method is a single remote operation. Errors are propagated to the
/// sync task, which aborts and reverts.
#[async_trait]
pub trait DataPlane: Send + Sync {
    /// Initialize the data plane with plugin specific configuration
    async fn init_data_plane(&self, config: &serde_json::Value) -> Result<(), crate::Error>;

    /// Add a DNS rule
    async fn add_dns_rule(&self, app: &AppInfo, rule: &DnsRule) -> Result<(), crate::Error>;

    /// Update a DNS rule in place
    async fn set_dns_rule(&self, app: &AppInfo, rule: &DnsRule) -> Result<(), crate::Error>;

    /// Delete a DNS rule
    async fn delete_dns_rule(&self, app: &AppInfo, rule: &DnsRule) -> Result<(), crate::Error>;

    /// Add a traffic rule
    async fn add_traffic_rule(&self, app: &AppInfo, rule: &TrafficRule)
    -> Result<(), crate::Error>;

    /// Update a traffic rule in place
    async fn set_traffic_rule(&self, app: &AppInfo, rule: &TrafficRule)
    -> Result<(), crate::Error>;

    /// Delete a traffic rule
    async fn delete_traffic_rule(&self, app: &AppInfo, rule_id: &str)
    -> Result<(), crate::Error>;

    /// Data plane name (for logging/debugging)
    fn data_plane_name(&self) -> &'static str;
}

/// Helper trait for constructing data planes from configuration
pub trait DataPlaneFactory: Send + Sync {
    /// Create a DataPlane instance from configuration
    fn create(
        &self,
        config: &crate::config::DataPlaneConfig,
    ) -> Result<Box<dyn DataPlane>, crate::Error>;
}
