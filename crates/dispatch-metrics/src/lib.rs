//! Metrics for Dispatch.
//!
//! [`MetricsRecorder`] collects per-request usage (agents, tools, model
//! calls) and persists each record once the request is finalized.
//! [`MetricsReport`] and [`RequestSummary`] aggregate persisted records.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use dispatch_metrics::MetricsRecorder;
//! use dispatch_models::Metadata;
//! use dispatch_persistence::MemoryMetricsStore;
//!
//! # async fn example() {
//! let metrics = MetricsRecorder::spawn(Arc::new(MemoryMetricsStore::new()));
//! let id = metrics.start_request("summarize this", Metadata::new());
//! metrics.track_agent_usage(&id, "summarizer", Some(0.8), Duration::from_millis(40), true, None);
//! metrics.end_request(&id, true);
//! metrics.flush().await;
//! # }
//! ```

pub mod recorder;
pub mod report;

pub use recorder::{MetricsHandle, MetricsRecorder};
pub use report::{last_days, CapabilityStats, MetricsReport, RequestSummary, DEFAULT_REPORT_DAYS};
