//! Per-handler execution results.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a candidate set is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One handler at a time, in candidate order.
    Sequential,
    /// Bounded concurrent fan-out.
    Parallel,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// Outcome of a single handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of invoking one candidate's handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Capability that produced this result.
    pub capability_id: String,

    /// Confidence the candidate was selected with.
    pub confidence: f64,

    /// Handler output (`Null` on failure).
    pub content: serde_json::Value,

    /// Success, error or timeout.
    pub status: ExecutionStatus,

    /// Failure reason, if any.
    pub error: Option<String>,

    /// Wall time spent on the invocation.
    pub duration: Duration,
}

impl ExecutionResult {
    /// Create a successful result.
    pub fn success(
        capability_id: impl Into<String>,
        confidence: f64,
        content: serde_json::Value,
        duration: Duration,
    ) -> Self {
        Self {
            capability_id: capability_id.into(),
            confidence,
            content,
            status: ExecutionStatus::Success,
            error: None,
            duration,
        }
    }

    /// Create an error result.
    pub fn error(
        capability_id: impl Into<String>,
        confidence: f64,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            capability_id: capability_id.into(),
            confidence,
            content: serde_json::Value::Null,
            status: ExecutionStatus::Error,
            error: Some(error.into()),
            duration,
        }
    }

    /// Create a timeout result.
    pub fn timeout(
        capability_id: impl Into<String>,
        confidence: f64,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            capability_id: capability_id.into(),
            confidence,
            content: serde_json::Value::Null,
            status: ExecutionStatus::Timeout,
            error: Some(error.into()),
            duration,
        }
    }

    /// Whether the invocation succeeded.
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Content rendered as plain text (strings unquoted).
    pub fn content_text(&self) -> String {
        match &self.content {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}
