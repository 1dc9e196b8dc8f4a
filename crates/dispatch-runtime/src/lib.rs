//! Execution runtime for Dispatch.
//!
//! The [`ExecutionCoordinator`] turns a selected candidate set into one
//! result per candidate, either one at a time or through a bounded worker
//! pool, with per-call timeouts and an optional outer deadline.

pub mod config;
pub mod coordinator;

pub use config::CoordinatorConfig;
pub use coordinator::ExecutionCoordinator;
