//! Dispatch command-line front end.
//!
//! The `dispatch` binary routes prompts through the orchestrator and reports
//! on recorded usage.

pub mod cli;
pub mod commands;
pub mod error;

pub use error::{CliError, Result};
