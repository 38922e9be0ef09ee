// # REST DNS Agent
//
// This crate provides the DNS agent that manages resource records on the
// platform's local DNS server through its management REST API.
//
// ## Behavior
//
// - One HTTP request per call; retries and rollback are owned by the sync task
// - HTTP timeout configured per backend (default 10 seconds)
// - Specific error messages for HTTP status codes (400, 404, 429, 5xx)
// - Deleting a record the server does not know succeeds
//
// ## API Reference
//
// - Add or replace records: PUT `/mep/dns_server_mgmt/v1/rrecord`
// - Delete a record: DELETE `/mep/dns_server_mgmt/v1/rrecord/:host/:type`

use async_trait::async_trait;
use mep_core::config::DnsAgentBackend;
use mep_core::registry::PluginRegistry;
use mep_core::traits::{DnsAgent, DnsAgentFactory};
use mep_core::{Error, Result};
use serde::Serialize;
use std::time::Duration;

/// Path of the resource record collection
const RRECORD_PATH: &str = "/mep/dns_server_mgmt/v1/rrecord";

/// One resource record in the management API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub rr_type: String,
    pub class: String,
    pub ttl: u32,
    #[serde(rename = "rData")]
    pub rdata: Vec<String>,
}

/// Body of an add/replace request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneEntry {
    pub zone: String,
    pub rr: Vec<ResourceRecord>,
}

/// DNS agent talking to the DNS server management REST API
#[derive(Debug)]
pub struct RestDnsAgent {
    /// Base URL without trailing slash
    endpoint: String,

    /// Zone the records belong to
    zone: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

impl RestDnsAgent {
    /// Create a new REST DNS agent
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Base URL of the management API (`http://` or `https://`)
    /// - `zone`: Zone the records are added to
    /// - `timeout`: Per-request HTTP timeout
    pub fn new(endpoint: impl Into<String>, zone: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::config(format!(
                "DNS agent endpoint must use HTTP or HTTPS scheme. Got: {}",
                endpoint
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            zone: zone.into(),
            client,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}{}", self.endpoint, RRECORD_PATH)
    }

    fn record_url(&self, host: &str, rr_type: &str) -> String {
        format!("{}{}/{}/{}", self.endpoint, RRECORD_PATH, host, rr_type)
    }

    /// Turn a non-success response into an error
    async fn check_response(
        response: reqwest::Response,
        action: &str,
        host: &str,
    ) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        Err(match status.as_u16() {
            400 => Error::dns_agent(format!(
                "DNS server rejected {} of {}: {}",
                action, host, error_text
            )),
            404 => Error::not_found(format!("DNS record {}", host)),
            429 => Error::dns_agent(format!(
                "DNS server rate limit exceeded during {} of {}. Status: {}",
                action, host, status
            )),
            500..=599 => Error::dns_agent(format!(
                "DNS server error (transient) during {} of {}: {} - {}",
                action, host, status, error_text
            )),
            _ => Error::dns_agent(format!(
                "{} of {} failed: {} - {}",
                action, host, status, error_text
            )),
        })
    }
}

#[async_trait]
impl DnsAgent for RestDnsAgent {
    async fn set_resource_record_type_a(
        &self,
        host: &str,
        rr_type: &str,
        class: &str,
        point_to: &[String],
        ttl: u32,
    ) -> Result<()> {
        let body = ZoneEntry {
            zone: self.zone.clone(),
            rr: vec![ResourceRecord {
                name: host.to_string(),
                rr_type: rr_type.to_string(),
                class: class.to_string(),
                ttl,
                rdata: point_to.to_vec(),
            }],
        };

        tracing::debug!("Setting {} record {} -> {:?}", rr_type, host, point_to);
        let response = self
            .client
            .put(self.collection_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::dns_agent(format!("HTTP request failed: {}", e)))?;

        Self::check_response(response, "update", host).await?;
        tracing::info!("Set {} record {} on local DNS server", rr_type, host);
        Ok(())
    }

    async fn delete_resource_record_type_a(&self, host: &str, rr_type: &str) -> Result<()> {
        tracing::debug!("Deleting {} record {}", rr_type, host);
        let response = self
            .client
            .delete(self.record_url(host, rr_type))
            .send()
            .await
            .map_err(|e| Error::dns_agent(format!("HTTP request failed: {}", e)))?;

        match Self::check_response(response, "delete", host).await {
            Ok(()) => {
                tracing::info!("Deleted {} record {} from local DNS server", rr_type, host);
                Ok(())
            }
            Err(Error::NotFound(_)) => {
                tracing::debug!("{} record {} already absent", rr_type, host);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn agent_name(&self) -> &'static str {
        "rest"
    }
}

/// Factory for creating REST DNS agents
pub struct RestDnsAgentFactory;

impl DnsAgentFactory for RestDnsAgentFactory {
    fn create(&self, config: &DnsAgentBackend) -> Result<Box<dyn DnsAgent>> {
        match config {
            DnsAgentBackend::Rest {
                endpoint,
                zone,
                timeout_secs,
            } => {
                config.validate()?;
                Ok(Box::new(RestDnsAgent::new(
                    endpoint.clone(),
                    zone.clone(),
                    Duration::from_secs(*timeout_secs),
                )?))
            }
            _ => Err(Error::config("Invalid config for REST DNS agent")),
        }
    }
}

/// Register the REST DNS agent with a registry
///
/// # Example
///
/// ```rust
/// use mep_core::PluginRegistry;
///
/// let registry = PluginRegistry::with_builtins();
/// mep_dns_agent::register(&registry);
/// assert!(registry.has_dns_agent("rest"));
/// ```
pub fn register(registry: &PluginRegistry) {
    registry.register_dns_agent("rest", Box::new(RestDnsAgentFactory));
}
