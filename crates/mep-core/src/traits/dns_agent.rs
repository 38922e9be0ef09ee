// # DNS Agent Trait
//
// Defines the interface for managing resource records on the local DNS
// server of the edge platform.
//
// ## Implementations
//
// - REST: `mep-dns-agent` crate
//
// ## Usage
//
// ```rust,ignore
// agent
//     .set_resource_record_type_a("app.mec.", "A", "IN", &["10.0.0.5".to_string()], 30)
//     .await?;
// agent.delete_resource_record_type_a("app.mec.", "A").await?;
// ```

use async_trait::async_trait;

/// Trait for DNS agent implementations
///
/// # Trust Level: Untrusted
///
/// Agents perform a single remote call per invocation. They do not retry,
/// cache, or touch the rule store; the sync task decides what to call and
/// reverts on failure.
#[async_trait]
pub trait DnsAgent: Send + Sync {
    /// Create or replace a resource record
    ///
    /// # Parameters
    ///
    /// - `host`: Fully qualified domain name
    /// - `rr_type`: Record type (`A` or `AAAA`)
    /// - `class`: Record class (normally `IN`)
    /// - `point_to`: Addresses the name resolves to
    /// - `ttl`: Time to live in seconds
    async fn set_resource_record_type_a(
        &self,
        host: &str,
        rr_type: &str,
        class: &str,
        point_to: &[String],
        ttl: u32,
    ) -> Result<(), crate::Error>;

    /// Delete a resource record
    async fn delete_resource_record_type_a(
        &self,
        host: &str,
        rr_type: &str,
    ) -> Result<(), crate::Error>;

    /// Agent name (for logging/debugging)
    fn agent_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS agents from configuration
pub trait DnsAgentFactory: Send + Sync {
    /// Create a DnsAgent instance from configuration
    fn create(
        &self,
        config: &crate::config::DnsAgentBackend,
    ) -> Result<Box<dyn DnsAgent>, crate::Error>;
}
