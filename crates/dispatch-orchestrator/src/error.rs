//! Error types for the orchestrator.

use thiserror::Error;

/// Failures that stop a request outright.
///
/// Selection, handler and aggregation problems never appear here; they
/// are folded into the returned response instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A store the orchestrator depends on cannot be used.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    /// The orchestrator could not be assembled. Never returned by `process`.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<dispatch_agent::RegistryError> for OrchestratorError {
    fn from(err: dispatch_agent::RegistryError) -> Self {
        Self::Infrastructure(format!("capability store: {}", err))
    }
}

impl From<dispatch_persistence::PersistenceError> for OrchestratorError {
    fn from(err: dispatch_persistence::PersistenceError) -> Self {
        Self::Infrastructure(format!("metrics store: {}", err))
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
