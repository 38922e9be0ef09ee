//! Core traits for the AppD synchronization engine
//!
//! This module defines the abstract interfaces of the engine's collaborators.
//!
//! - [`RuleStore`]: Key-value persistence for configs, jobs and task status
//! - [`DnsAgent`]: Resource records on the local DNS server
//! - [`DataPlane`]: DNS and traffic rules on the data plane (Mp2)

pub mod data_plane;
pub mod dns_agent;
pub mod rule_store;

pub use data_plane::{DataPlane, DataPlaneFactory};
pub use dns_agent::{DnsAgent, DnsAgentFactory};
pub use rule_store::{RuleStore, RuleStoreFactory};
