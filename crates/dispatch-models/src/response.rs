//! Final response returned to callers.

use serde::{Deserialize, Serialize};

use crate::request::Metadata;

/// Final status of a routed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The single merged output of a routing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Merged content.
    pub content: serde_json::Value,

    /// Routing metadata (request ID, agents used, ...).
    #[serde(default)]
    pub metadata: Metadata,

    /// Success or error.
    pub status: ResponseStatus,
}

impl Response {
    /// Create a successful response.
    pub fn success(content: serde_json::Value) -> Self {
        Self {
            content,
            metadata: Metadata::new(),
            status: ResponseStatus::Success,
        }
    }

    /// Create an error response with an explanatory message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: serde_json::Value::String(message.into()),
            metadata: Metadata::new(),
            status: ResponseStatus::Error,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the response is a success.
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}
