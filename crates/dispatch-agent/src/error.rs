//! Error types for the agent crate.

use thiserror::Error;

/// Errors raised by the capability store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A capability with this ID is already registered.
    #[error("capability already registered: {0}")]
    Duplicate(String),

    /// No capability with this ID.
    #[error("capability not found: {0}")]
    NotFound(String),

    /// The store cannot be used (poisoned lock).
    #[error("capability store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur in agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The generation capability failed.
    #[error("generation failed ({provider}): {message}")]
    Generation {
        /// Provider that produced the failure.
        provider: String,
        /// Provider-specific detail.
        message: String,
    },

    /// No handler could be built for a capability.
    #[error("handler creation failed for {capability_id}: {message}")]
    HandlerCreation {
        capability_id: String,
        message: String,
    },

    /// A handler ran and failed.
    #[error("handler {capability_id} failed: {message}")]
    Execution {
        capability_id: String,
        message: String,
    },

    /// Capability store error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Shorthand for a generation failure.
    pub fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
