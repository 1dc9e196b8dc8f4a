//! Orchestration for Dispatch.
//!
//! The [`Orchestrator`] is the single entry point: it selects agents for a
//! request, runs them, merges their outputs through a [`ResponseAggregator`],
//! and reports every step to the metrics recorder.
//!
//! # Example
//!
//! ```ignore
//! use dispatch_core::{Layout, Settings};
//! use dispatch_orchestrator::Orchestrator;
//!
//! let layout = Layout::default();
//! let settings = Settings::load(&layout.settings_file())?;
//! let orchestrator = Orchestrator::from_settings(&settings, &layout, generator)?;
//!
//! let response = orchestrator.process(Request::new("translate hello to french")).await?;
//! ```

pub mod aggregator;
pub mod error;
pub mod orchestrator;
pub mod use_case;

pub use aggregator::{BestOf, Concatenate, MergePolicy, ResponseAggregator, NO_CAPABILITY};
pub use error::{OrchestratorError, Result};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RequestPhase};
pub use use_case::UseCase;
