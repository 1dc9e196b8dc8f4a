//! Persistence layer for Dispatch.
//!
//! This crate provides crash-safe, append-only persistence for finalized
//! request metrics using atomic file operations (write to temp file, then
//! link into place).
//!
//! # Example
//!
//! ```no_run
//! use dispatch_models::{Metadata, RequestMetricsRecord};
//! use dispatch_persistence::{FileMetricsStore, MetricsStore};
//!
//! let store = FileMetricsStore::new("/home/user/.dispatch/metrics").unwrap();
//!
//! let mut record = RequestMetricsRecord::open("req-1", "translate hello", Metadata::new());
//! record.finalize(chrono::Utc::now(), true, None);
//! store.append(&record).unwrap();
//!
//! let loaded = store.load("req-1").unwrap();
//! ```

pub mod atomic;
pub mod error;
pub mod metrics_store;

pub use error::{PersistenceError, Result};
pub use metrics_store::{FileMetricsStore, MemoryMetricsStore, MetricsStore};
