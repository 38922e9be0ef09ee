// # mep-core
//
// Core library of the MEP AppD configuration sync engine.
//
// ## Architecture Overview
//
// An edge application's descriptor (AppD) carries DNS rules and traffic
// rules. Changing it is a staged, crash-resumable task:
// - **RuleStore**: Trait for the key-value store holding configs, jobs and task statuses
// - **DnsAgent**: Trait for resource records on the local DNS server
// - **DataPlane**: Trait for rules on the data plane (Mp2)
// - **Task**: Drives every rule through its state machine, reverting on failure
// - **Worker**: Runs tasks in the background and survives panics inside them
// - **PluginRegistry**: Plugin-based registry for stores, DNS agents and data planes
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Resumable**: Every rule step is persisted before the next one starts
// 3. **Plugin-Based**: Components are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Compensating**: A failed task undoes what it already applied

pub mod config;
pub mod dataplane;
pub mod error;
pub mod model;
pub mod paths;
pub mod registry;
pub mod store;
pub mod task;
pub mod traits;
pub mod worker;

// Re-export core types for convenience
pub use config::{
    DataPlaneConfig, DnsAgentBackend, DnsAgentConfig, DnsAgentMode, MepConfig, RuleStoreConfig,
    WorkerConfig,
};
pub use dataplane::NoneDataPlane;
pub use error::{Error, Result};
pub use model::{AppDConfig, AppInfo, DnsRule, Operation, RuleActivation, TrafficRule};
pub use paths::KeyPaths;
pub use registry::PluginRegistry;
pub use store::{FileRuleStore, MemoryRuleStore};
pub use task::{Task, TaskContext, TaskState, TaskStatus};
pub use traits::{DataPlane, DnsAgent, RuleStore};
pub use worker::Worker;
