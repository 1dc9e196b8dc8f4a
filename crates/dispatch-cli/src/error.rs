//! CLI error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] dispatch_core::ConfigError),

    #[error(transparent)]
    Agent(#[from] dispatch_agent::AgentError),

    #[error(transparent)]
    Orchestrator(#[from] dispatch_orchestrator::OrchestratorError),

    #[error("metrics store error: {0}")]
    Persistence(#[from] dispatch_persistence::PersistenceError),

    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    #[error("no metrics recorded for request {0}")]
    RequestNotFound(String),
}

pub type Result<T> = std::result::Result<T, CliError>;
