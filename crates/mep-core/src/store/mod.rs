// # Rule Store Implementations
//
// This module provides implementations of the RuleStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::{FileRuleStore, FileRuleStoreFactory};
pub use memory::{MemoryRuleStore, MemoryRuleStoreFactory};
