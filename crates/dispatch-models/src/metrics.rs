//! Request lifecycle metrics records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::Metadata;

/// Maximum number of prompt characters kept in a record.
pub const PROMPT_PREVIEW_LIMIT: usize = 1000;

/// One agent or tool invocation observed during a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    /// Agent or tool ID.
    pub capability_id: String,

    /// Selection confidence, when the capability was scored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Invocation time in milliseconds.
    pub duration_ms: u64,

    /// Whether the invocation succeeded.
    pub success: bool,

    /// Extra detail (error reason, status, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// When the entry was appended.
    pub recorded_at: DateTime<Utc>,
}

/// One generation-model call observed during a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsageEntry {
    /// Model identifier.
    pub model_id: String,

    /// Estimated prompt tokens.
    #[serde(default)]
    pub tokens_in: u64,

    /// Estimated completion tokens.
    #[serde(default)]
    pub tokens_out: u64,

    /// Call time in milliseconds.
    pub duration_ms: u64,

    /// Whether the call succeeded.
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// When the entry was appended.
    pub recorded_at: DateTime<Utc>,
}

/// Everything recorded about one request.
///
/// Open while the request runs; finalized exactly once, after which it is
/// never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetricsRecord {
    pub request_id: String,

    /// Prompt, truncated to [`PROMPT_PREVIEW_LIMIT`] characters.
    pub prompt: String,

    /// Whitespace word count of the full prompt.
    #[serde(default)]
    pub prompt_tokens: u64,

    #[serde(default)]
    pub metadata: Metadata,

    pub start_time: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub agent_usages: Vec<UsageEntry>,

    #[serde(default)]
    pub tool_usages: Vec<UsageEntry>,

    #[serde(default)]
    pub model_usages: Vec<ModelUsageEntry>,
}

impl RequestMetricsRecord {
    /// Open a record starting now.
    pub fn open(request_id: impl Into<String>, prompt: &str, metadata: Metadata) -> Self {
        Self::open_at(request_id, prompt, metadata, Utc::now())
    }

    /// Open a record with an explicit start time.
    pub fn open_at(
        request_id: impl Into<String>,
        prompt: &str,
        metadata: Metadata,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            prompt: prompt.chars().take(PROMPT_PREVIEW_LIMIT).collect(),
            prompt_tokens: prompt.split_whitespace().count() as u64,
            metadata,
            start_time,
            end_time: None,
            duration_ms: None,
            success: false,
            error: None,
            agent_usages: Vec::new(),
            tool_usages: Vec::new(),
            model_usages: Vec::new(),
        }
    }

    /// Whether the record has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Finalize the record.
    ///
    /// Returns `false` without touching anything if already finalized.
    /// `end_time` is never earlier than `start_time`, even if the clock
    /// stepped backwards.
    pub fn finalize(&mut self, now: DateTime<Utc>, success: bool, error: Option<String>) -> bool {
        if self.is_finalized() {
            return false;
        }

        let end = now.max(self.start_time);
        let elapsed = (end - self.start_time).num_milliseconds().max(0) as u64;

        self.end_time = Some(end);
        self.duration_ms = Some(elapsed);
        self.success = success;
        self.error = error;
        true
    }

    /// Whether the record started inside `[start, end]`.
    pub fn started_within(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time >= start && self.start_time <= end
    }
}
