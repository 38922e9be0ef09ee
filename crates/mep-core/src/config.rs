//! Configuration types for the AppD synchronization engine
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Main MEP configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MepConfig {
    /// Rule store configuration
    #[serde(default)]
    pub store: RuleStoreConfig,

    /// DNS agent configuration
    #[serde(default)]
    pub dns_agent: DnsAgentConfig,

    /// Data plane configuration
    #[serde(default)]
    pub data_plane: DataPlaneConfig,

    /// Optional worker settings
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl MepConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()?;
        self.dns_agent.validate()?;
        self.data_plane.validate()?;
        self.worker.validate()?;
        Ok(())
    }
}

/// Rule store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleStoreConfig {
    /// File-based rule store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory rule store (not persistent)
    #[default]
    Memory,

    /// Custom rule store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl RuleStoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            RuleStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("File rule store path cannot be empty"))
            }
            RuleStoreConfig::Custom { factory, .. } if factory.is_empty() => Err(
                crate::Error::config("Custom rule store factory cannot be empty"),
            ),
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            RuleStoreConfig::File { .. } => "file",
            RuleStoreConfig::Memory => "memory",
            RuleStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Where DNS rules are realized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsAgentMode {
    /// Local DNS server only
    #[default]
    Local,
    /// Data plane only
    Dataplane,
    /// Data plane, then local DNS server
    All,
}

impl DnsAgentMode {
    /// Whether DNS rules are pushed to the data plane
    pub fn uses_data_plane(&self) -> bool {
        matches!(self, DnsAgentMode::Dataplane | DnsAgentMode::All)
    }

    /// Whether DNS rules are pushed to the local DNS server
    pub fn uses_local(&self) -> bool {
        matches!(self, DnsAgentMode::Local | DnsAgentMode::All)
    }
}

impl std::str::FromStr for DnsAgentMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(DnsAgentMode::Local),
            "dataplane" => Ok(DnsAgentMode::Dataplane),
            "all" | "both" => Ok(DnsAgentMode::All),
            other => Err(crate::Error::config(format!(
                "Unknown DNS agent mode '{}'. Supported modes: local, dataplane, all",
                other
            ))),
        }
    }
}

/// DNS agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsAgentConfig {
    /// Which stages DNS rules go through
    #[serde(default)]
    pub mode: DnsAgentMode,

    /// Backend used for the local DNS server stage
    #[serde(default)]
    pub backend: DnsAgentBackend,
}

impl DnsAgentConfig {
    /// Validate the DNS agent configuration
    ///
    /// The backend is only checked when the local stage is enabled.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.mode.uses_local() {
            self.backend.validate()?;
        }
        Ok(())
    }
}

/// Local DNS server backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DnsAgentBackend {
    /// DNS server management REST API
    Rest {
        /// Base URL of the DNS server management API
        endpoint: String,
        /// Zone the records are added to
        #[serde(default = "default_zone")]
        zone: String,
        /// HTTP timeout in seconds
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom DNS agent
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl DnsAgentBackend {
    /// Validate the backend configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DnsAgentBackend::Rest {
                endpoint,
                timeout_secs,
                ..
            } => {
                if endpoint.is_empty() {
                    return Err(crate::Error::config("DNS agent endpoint cannot be empty"));
                }
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "DNS agent endpoint must use HTTP or HTTPS scheme. Got: {}",
                        endpoint
                    )));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("DNS agent timeout must be > 0"));
                }
                Ok(())
            }
            DnsAgentBackend::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom DNS agent factory cannot be empty",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the backend type name
    pub fn type_name(&self) -> &str {
        match self {
            DnsAgentBackend::Rest { .. } => "rest",
            DnsAgentBackend::Custom { factory, .. } => factory,
        }
    }
}

impl Default for DnsAgentBackend {
    fn default() -> Self {
        DnsAgentBackend::Rest {
            endpoint: "http://127.0.0.1:8086".to_string(),
            zone: default_zone(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Data plane configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataPlaneConfig {
    /// No data plane; every call succeeds without effect
    #[default]
    None,

    /// Custom data plane
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl DataPlaneConfig {
    /// Validate the data plane configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DataPlaneConfig::Custom { factory, .. } if factory.is_empty() => Err(
                crate::Error::config("Custom data plane factory cannot be empty"),
            ),
            _ => Ok(()),
        }
    }

    /// Get the data plane type name
    pub fn type_name(&self) -> &str {
        match self {
            DataPlaneConfig::None => "none",
            DataPlaneConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Root under which all store keys live
    #[serde(default = "default_key_root")]
    pub key_root: String,
}

impl WorkerConfig {
    /// Validate the worker configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.key_root.starts_with('/') {
            return Err(crate::Error::config(format!(
                "Key root must be an absolute path. Got: {}",
                self.key_root
            )));
        }
        Ok(())
    }

    /// Store key layout for this configuration
    pub fn key_paths(&self) -> crate::paths::KeyPaths {
        crate::paths::KeyPaths::new(self.key_root.clone())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            key_root: default_key_root(),
        }
    }
}

fn default_zone() -> String {
    ".".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_key_root() -> String {
    crate::paths::DEFAULT_KEY_ROOT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MepConfig::new().validate().is_ok());
    }

    #[test]
    fn dns_mode_stages() {
        assert!(DnsAgentMode::Local.uses_local());
        assert!(!DnsAgentMode::Local.uses_data_plane());
        assert!(DnsAgentMode::Dataplane.uses_data_plane());
        assert!(!DnsAgentMode::Dataplane.uses_local());
        assert!(DnsAgentMode::All.uses_local() && DnsAgentMode::All.uses_data_plane());
        assert_eq!("both".parse::<DnsAgentMode>().unwrap(), DnsAgentMode::All);
        assert!("mp2".parse::<DnsAgentMode>().is_err());
    }

    #[test]
    fn rest_backend_requires_scheme_only_when_local_is_used() {
        let mut config = DnsAgentConfig {
            mode: DnsAgentMode::Local,
            backend: DnsAgentBackend::Rest {
                endpoint: "dns.local:8080".to_string(),
                zone: default_zone(),
                timeout_secs: 5,
            },
        };
        assert!(config.validate().is_err());

        config.mode = DnsAgentMode::Dataplane;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_tagged_sections() {
        let config: MepConfig = serde_json::from_value(serde_json::json!({
            "store": { "type": "file", "path": "/var/lib/mep/store.json" },
            "dns_agent": { "mode": "all" },
            "data_plane": { "type": "none" }
        }))
        .unwrap();

        assert_eq!(config.store.type_name(), "file");
        assert_eq!(config.dns_agent.mode, DnsAgentMode::All);
        assert_eq!(config.data_plane.type_name(), "none");
        assert_eq!(config.worker.key_root, "/cse");
    }
}
