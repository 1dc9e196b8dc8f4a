//! Core data models for Dispatch.
//!
//! This crate provides the plain data types shared by every Dispatch crate:
//! capability descriptors, requests, candidates, execution results, final
//! responses, and the per-request metrics records.

pub mod capability;
pub mod execution;
pub mod metrics;
pub mod request;
pub mod response;

// Re-export main types
pub use capability::{Candidate, CapabilityDescriptor, CapabilityKind};
pub use execution::{ExecutionMode, ExecutionResult, ExecutionStatus};
pub use metrics::{ModelUsageEntry, RequestMetricsRecord, UsageEntry, PROMPT_PREVIEW_LIMIT};
pub use request::{Message, MessageRole, Metadata, Request};
pub use response::{Response, ResponseStatus};
