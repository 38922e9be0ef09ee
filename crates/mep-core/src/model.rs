//! AppD data model
//!
//! The application descriptor (AppD) owned by one edge application instance:
//! its DNS rules and traffic rules. The same [`AppDConfig`] shape is used for
//! the staged job record and for the durable config record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested operation on an AppD configuration
///
/// Only meaningful on the staged job copy; the durable config record never
/// carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// First configuration for the app instance
    Create,
    /// Replace an existing configuration
    Update,
    /// Remove the configuration
    Delete,
}

/// Desired activation state of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleActivation {
    /// Rule is realized on the DNS server / data plane
    #[default]
    #[serde(rename = "ACTIVE", alias = "")]
    Active,
    /// Rule is kept in the descriptor but not realized
    #[serde(rename = "INACTIVE")]
    Inactive,
}

/// The two kinds of rules carried by an AppD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// DNS rules
    Dns,
    /// Traffic rules
    Traffic,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Dns => f.write_str("dns"),
            RuleKind::Traffic => f.write_str("traffic"),
        }
    }
}

/// Common view over DNS and traffic rules used by the state machine
pub trait Rule: Clone + PartialEq + Send + Sync + 'static {
    /// Which rule kind this is
    const KIND: RuleKind;

    /// Caller-assigned stable rule identifier
    fn id(&self) -> &str;

    /// Desired activation state
    fn activation(&self) -> RuleActivation;

    /// Whether the rule should be realized remotely
    fn is_active(&self) -> bool {
        self.activation() == RuleActivation::Active
    }
}

/// IP address family of a DNS rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IpAddressType {
    /// IPv4 (A record)
    #[default]
    #[serde(rename = "IP_V4")]
    IpV4,
    /// IPv6 (AAAA record)
    #[serde(rename = "IP_V6")]
    IpV6,
}

impl IpAddressType {
    /// DNS resource record type for this address family
    pub fn rr_type(&self) -> &'static str {
        match self {
            IpAddressType::IpV4 => "A",
            IpAddressType::IpV6 => "AAAA",
        }
    }
}

/// DNS rule of an application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRule {
    /// Stable rule identifier
    pub dns_rule_id: String,
    /// Fully qualified domain name
    pub domain_name: String,
    /// Address family
    #[serde(default)]
    pub ip_address_type: IpAddressType,
    /// Address the domain resolves to
    pub ip_address: String,
    /// Time to live in seconds
    #[serde(default)]
    pub ttl: u32,
    /// Activation state
    #[serde(default)]
    pub state: RuleActivation,
}

impl Rule for DnsRule {
    const KIND: RuleKind = RuleKind::Dns;

    fn id(&self) -> &str {
        &self.dns_rule_id
    }

    fn activation(&self) -> RuleActivation {
        self.state
    }
}

/// Traffic filter granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterType {
    /// Match on flow tuples
    #[default]
    Flow,
    /// Match on packet contents
    Packet,
}

/// Action taken on matched traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficAction {
    Drop,
    #[default]
    Passthrough,
    ForwardDecapsulated,
    ForwardAsIs,
    DuplicatedDecapsulated,
    DuplicateAsIs,
}

/// Traffic matching criteria
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrafficFilter {
    pub src_address: Vec<String>,
    pub dst_address: Vec<String>,
    pub src_port: Vec<String>,
    pub dst_port: Vec<String>,
    pub protocol: Vec<String>,
    pub tag: Vec<String>,
    #[serde(rename = "qCI")]
    pub qci: i32,
    #[serde(rename = "dSCP")]
    pub dscp: i32,
    #[serde(rename = "tC")]
    pub tc: i32,
}

/// Forwarding destination for traffic rules with a forward action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DestinationInterface {
    pub interface_type: String,
    pub src_mac_address: String,
    pub dst_mac_address: String,
    pub dst_ip_address: String,
}

/// Traffic rule of an application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRule {
    /// Stable rule identifier
    pub traffic_rule_id: String,
    #[serde(default)]
    pub filter_type: FilterType,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub traffic_filter: Vec<TrafficFilter>,
    #[serde(default)]
    pub action: TrafficAction,
    #[serde(default)]
    pub dst_interface: Vec<DestinationInterface>,
    #[serde(default)]
    pub state: RuleActivation,
}

impl Rule for TrafficRule {
    const KIND: RuleKind = RuleKind::Traffic;

    fn id(&self) -> &str {
        &self.traffic_rule_id
    }

    fn activation(&self) -> RuleActivation {
        self.state
    }
}

/// Application descriptor configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDConfig {
    #[serde(rename = "appTrafficRule", default)]
    pub app_traffic_rule: Vec<TrafficRule>,
    #[serde(rename = "appDNSRule", default)]
    pub app_dns_rule: Vec<DnsRule>,
    #[serde(default)]
    pub app_support_mp1: bool,
    #[serde(default)]
    pub app_name: String,
    /// For local use only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
}

impl AppDConfig {
    /// Copy suitable for the durable config record (operation stripped)
    pub fn for_storage(&self) -> Self {
        Self {
            operation: None,
            ..self.clone()
        }
    }

    /// Rules of the given kind
    pub fn rules<R: RuleSource>(&self) -> &[R] {
        R::rules_of(self)
    }
}

/// Selects the rule list of a kind from an [`AppDConfig`]
pub trait RuleSource: Rule {
    /// The rule list of this kind
    fn rules_of(config: &AppDConfig) -> &[Self];
}

impl RuleSource for DnsRule {
    fn rules_of(config: &AppDConfig) -> &[Self] {
        &config.app_dns_rule
    }
}

impl RuleSource for TrafficRule {
    fn rules_of(config: &AppDConfig) -> &[Self] {
        &config.app_traffic_rule
    }
}

/// Identity of the application instance a rule belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// Application instance id
    pub instance_id: String,
    /// Application name
    pub name: String,
}
