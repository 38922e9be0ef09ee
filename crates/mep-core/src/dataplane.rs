//! Built-in data plane implementations
//!
//! Only the `none` data plane ships with the core: every call is logged and
//! succeeds. Platforms without an Mp2 data plane run with it, and DNS rules
//! then only reach the local DNS server.

use async_trait::async_trait;
use tracing::debug;

use crate::config::DataPlaneConfig;
use crate::error::{Error, Result};
use crate::model::{AppInfo, DnsRule, TrafficRule};
use crate::traits::{DataPlane, DataPlaneFactory};

/// Data plane that accepts every request without effect
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneDataPlane;

#[async_trait]
impl DataPlane for NoneDataPlane {
    async fn init_data_plane(&self, _config: &serde_json::Value) -> Result<()> {
        debug!("none data plane initialized");
        Ok(())
    }

    async fn add_dns_rule(&self, app: &AppInfo, rule: &DnsRule) -> Result<()> {
        debug!("none data plane: add dns rule {} for {}", rule.dns_rule_id, app.instance_id);
        Ok(())
    }

    async fn set_dns_rule(&self, app: &AppInfo, rule: &DnsRule) -> Result<()> {
        debug!("none data plane: set dns rule {} for {}", rule.dns_rule_id, app.instance_id);
        Ok(())
    }

    async fn delete_dns_rule(&self, app: &AppInfo, rule: &DnsRule) -> Result<()> {
        debug!("none data plane: delete dns rule {} for {}", rule.dns_rule_id, app.instance_id);
        Ok(())
    }

    async fn add_traffic_rule(&self, app: &AppInfo, rule: &TrafficRule) -> Result<()> {
        debug!(
            "none data plane: add traffic rule {} for {}",
            rule.traffic_rule_id, app.instance_id
        );
        Ok(())
    }

    async fn set_traffic_rule(&self, app: &AppInfo, rule: &TrafficRule) -> Result<()> {
        debug!(
            "none data plane: set traffic rule {} for {}",
            rule.traffic_rule_id, app.instance_id
        );
        Ok(())
    }

    async fn delete_traffic_rule(&self, app: &AppInfo, rule_id: &str) -> Result<()> {
        debug!("none data plane: delete traffic rule {} for {}", rule_id, app.instance_id);
        Ok(())
    }

    fn data_plane_name(&self) -> &'static str {
        "none"
    }
}

/// Factory for [`NoneDataPlane`]
pub struct NoneDataPlaneFactory;

impl DataPlaneFactory for NoneDataPlaneFactory {
    fn create(&self, config: &DataPlaneConfig) -> Result<Box<dyn DataPlane>> {
        match config {
            DataPlaneConfig::None => Ok(Box::new(NoneDataPlane)),
            _ => Err(Error::config("Invalid config for none data plane")),
        }
    }
}
