//! Capabilities and selection for Dispatch.
//!
//! This crate holds everything an agent or tool is made of:
//!
//! - [`CapabilityRegistry`]: descriptors with race-free usage counters
//! - [`Generator`]: the opaque text-generation capability
//! - [`ConfidenceSelector`]: generation-scored candidate selection
//! - [`Handler`] / [`HandlerFactory`]: the uniform invocation interface
//! - [`HandlerContext`]: per-invocation context, including tool access
//!
//! # Example
//!
//! ```ignore
//! use dispatch_agent::{CapabilityRegistry, ConfidenceSelector};
//! use dispatch_models::{CapabilityKind, Request};
//!
//! let selector = ConfidenceSelector::new(generator);
//! let agents = registry.list(CapabilityKind::Agent)?;
//! let candidates = selector.select(&Request::new("translate hello"), &agents, 0.5, false).await;
//! ```

pub mod builtin;
pub mod client;
pub mod error;
pub mod generator;
pub mod handler;
pub mod registry;
pub mod selector;
pub mod usage;

pub use builtin::{builtin_handlers, CurrentTimeTool, PromptAgent, WordCountTool};
pub use client::OpenRouterClient;
pub use error::{AgentError, RegistryError, Result};
pub use generator::{estimate_tokens, Generator};
pub use handler::{Dispatch, Handler, HandlerContext, HandlerFactory, HandlerRegistry, ToolAccess};
pub use registry::CapabilityRegistry;
pub use selector::{parse_scores, ConfidenceSelector};
pub use usage::record_results;
