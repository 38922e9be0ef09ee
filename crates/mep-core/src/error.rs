//! Error types for the AppD synchronization engine
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for MEP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Store error codes carried by [`Error::Store`]
///
/// `0` denotes success and is never carried by an error.
pub mod store_code {
    /// Record does not exist
    pub const NOT_FOUND: i32 = 1;
    /// Record could not be written
    pub const WRITE_FAILED: i32 = 2;
    /// Record could not be deleted
    pub const DELETE_FAILED: i32 = 3;
    /// Record could not be read
    pub const READ_FAILED: i32 = 4;
}

/// Core error type for the AppD synchronization engine
#[derive(Error, Debug)]
pub enum Error {
    /// Rule store failure with its integer error code
    #[error("Rule store error (code {code}): {message}")]
    Store {
        /// Store error code (see [`store_code`])
        code: i32,
        /// Error message
        message: String,
    },

    /// Record not found in the rule store
    #[error("Record not found: {0}")]
    NotFound(String),

    /// DNS agent errors (remote DNS server)
    #[error("DNS agent error: {0}")]
    DnsAgent(String),

    /// Data plane errors (Mp2)
    #[error("Data plane error: {0}")]
    DataPlane(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Job and store records disagree with the recorded rule statuses
    #[error("{0}")]
    Consistency(String),

    /// Another job is already staged for the app instance
    #[error("Operation in progress for app instance {0}")]
    OperationInProgress(String),

    /// A sync task ended in the failure state
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a rule store error
    pub fn store(code: i32, msg: impl Into<String>) -> Self {
        Self::Store {
            code,
            message: msg.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a DNS agent error
    pub fn dns_agent(msg: impl Into<String>) -> Self {
        Self::DnsAgent(msg.into())
    }

    /// Create a data plane error
    pub fn data_plane(msg: impl Into<String>) -> Self {
        Self::DataPlane(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a data-consistency error
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// The error raised when a Modify/Delete rule has no prior value
    pub fn existing_rule_expected() -> Self {
        Self::Consistency("existing rule expected".to_string())
    }

    /// Store error code, if this is a store failure
    ///
    /// [`Error::NotFound`] maps to [`store_code::NOT_FOUND`].
    pub fn store_code(&self) -> Option<i32> {
        match self {
            Self::Store { code, .. } => Some(*code),
            Self::NotFound(_) => Some(store_code::NOT_FOUND),
            _ => None,
        }
    }

    /// Whether this error reports a missing record
    pub fn is_not_found(&self) -> bool {
        self.store_code() == Some(store_code::NOT_FOUND)
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
