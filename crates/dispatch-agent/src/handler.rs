//! Handler interface, handler factory, and the per-invocation context.
//!
//! Agents and tools are looked up by ID in a [`HandlerRegistry`] that maps
//! each ID to a constructor. Every constructed handler runs through the
//! same [`Handler::run`] interface. Agents reach tools through
//! [`HandlerContext::use_tools`], which selects and dispatches tools the
//! same way the orchestrator does for agents.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_metrics::MetricsHandle;
use dispatch_models::{Candidate, CapabilityKind, ExecutionMode, ExecutionResult, Request};
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::registry::CapabilityRegistry;
use crate::selector::ConfidenceSelector;
use crate::usage::record_results;

/// A runnable agent or tool.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Produce content for `request`.
    async fn run(&self, request: &Request, ctx: &HandlerContext) -> Result<serde_json::Value>;
}

/// Builds handlers for capability IDs.
pub trait HandlerFactory: Send + Sync {
    /// Fails with [`AgentError::HandlerCreation`] when `capability_id` has
    /// no handler.
    fn create(&self, capability_id: &str, request: &Request) -> Result<Arc<dyn Handler>>;
}

/// Runs a candidate set; implemented by the execution coordinator.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Return exactly one result per candidate, in candidate order.
    async fn dispatch(
        &self,
        request: &Request,
        candidates: &[Candidate],
        mode: ExecutionMode,
        ctx: &HandlerContext,
    ) -> Vec<ExecutionResult>;
}

type Constructor = Arc<dyn Fn(&Request) -> Result<Arc<dyn Handler>> + Send + Sync>;

/// ID → constructor table.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    constructors: HashMap<String, Constructor>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.constructors.keys().collect();
        ids.sort();
        f.debug_struct("HandlerRegistry").field("ids", &ids).finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor invoked once per request.
    pub fn register<F>(&mut self, id: impl Into<String>, constructor: F)
    where
        F: Fn(&Request) -> Result<Arc<dyn Handler>> + Send + Sync + 'static,
    {
        self.constructors.insert(id.into(), Arc::new(constructor));
    }

    /// Register one shared handler instance.
    pub fn register_shared(&mut self, id: impl Into<String>, handler: Arc<dyn Handler>) {
        self.register(id, move |_| Ok(Arc::clone(&handler)));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl HandlerFactory for HandlerRegistry {
    fn create(&self, capability_id: &str, request: &Request) -> Result<Arc<dyn Handler>> {
        let constructor =
            self.constructors
                .get(capability_id)
                .ok_or_else(|| AgentError::HandlerCreation {
                    capability_id: capability_id.to_string(),
                    message: "no handler registered".to_string(),
                })?;

        constructor(request).map_err(|e| match e {
            AgentError::HandlerCreation { .. } => e,
            other => AgentError::HandlerCreation {
                capability_id: capability_id.to_string(),
                message: other.to_string(),
            },
        })
    }
}

/// What an agent needs to select and run tools.
#[derive(Clone)]
pub struct ToolAccess {
    pub selector: Arc<ConfidenceSelector>,
    pub registry: Arc<CapabilityRegistry>,
    pub dispatcher: Arc<dyn Dispatch>,
    pub threshold: f64,
    pub include_history: bool,
}

/// Per-invocation context handed to every handler.
#[derive(Clone)]
pub struct HandlerContext {
    request_id: String,
    metrics: Option<MetricsHandle>,
    tools: Option<ToolAccess>,
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("request_id", &self.request_id)
            .field("metrics", &self.metrics.is_some())
            .field("tools", &self.tools.is_some())
            .finish()
    }
}

impl HandlerContext {
    pub fn new(request_id: impl Into<String>, metrics: Option<MetricsHandle>) -> Self {
        Self {
            request_id: request_id.into(),
            metrics,
            tools: None,
        }
    }

    /// Context without metrics or tools.
    pub fn detached(request_id: impl Into<String>) -> Self {
        Self::new(request_id, None)
    }

    pub fn with_tools(mut self, tools: ToolAccess) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn metrics(&self) -> Option<&MetricsHandle> {
        self.metrics.as_ref()
    }

    pub fn has_tools(&self) -> bool {
        self.tools.is_some()
    }

    /// The same context without tool access; tools never call tools.
    pub fn without_tools(&self) -> Self {
        Self {
            tools: None,
            ..self.clone()
        }
    }

    /// Record a generation call made by a handler.
    pub fn track_model_usage(
        &self,
        model_id: &str,
        tokens_in: u64,
        tokens_out: u64,
        duration: Duration,
        success: bool,
    ) {
        if let Some(metrics) = &self.metrics {
            metrics.track_model_usage(
                &self.request_id,
                model_id,
                tokens_in,
                tokens_out,
                duration,
                success,
                None,
            );
        }
    }

    /// Select tools relevant to `request` and run them.
    ///
    /// Returns one result per selected tool; empty when tools are disabled
    /// or none apply. Usage is recorded against the request.
    pub async fn use_tools(&self, request: &Request) -> Result<Vec<ExecutionResult>> {
        let Some(access) = &self.tools else {
            return Ok(Vec::new());
        };

        let descriptors = access.registry.list(CapabilityKind::Tool)?;
        let selected = access
            .selector
            .select(request, &descriptors, access.threshold, access.include_history)
            .await;
        if selected.is_empty() {
            debug!(request_id = %self.request_id, "no tools selected");
            return Ok(Vec::new());
        }

        let all_independent = selected.iter().all(|c| {
            descriptors
                .iter()
                .find(|d| d.id == c.capability_id)
                .is_some_and(|d| d.independent)
        });
        let mode = if selected.len() > 1 && all_independent {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };

        let results = access
            .dispatcher
            .dispatch(request, &selected, mode, &self.without_tools())
            .await;
        record_results(
            self.metrics.as_ref(),
            &access.registry,
            &self.request_id,
            CapabilityKind::Tool,
            &results,
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn run(&self, request: &Request, _ctx: &HandlerContext) -> Result<Value> {
            Ok(json!(request.prompt))
        }
    }

    #[tokio::test]
    async fn test_registry_creates_handlers() {
        let mut registry = HandlerRegistry::new();
        registry.register_shared("echo", Arc::new(Echo));

        let request = Request::new("ping");
        let handler = registry.create("echo", &request).unwrap();
        let out = handler.run(&request, &HandlerContext::detached(&request.id)).await.unwrap();

        assert_eq!(out, json!("ping"));
        assert_eq!(registry.ids(), vec!["echo"]);
    }

    #[test]
    fn test_missing_handler_is_creation_error() {
        let registry = HandlerRegistry::new();
        let err = registry.create("nope", &Request::new("x")).err().unwrap();

        let AgentError::HandlerCreation { capability_id, .. } = err else {
            panic!("expected a handler creation error");
        };
        assert_eq!(capability_id, "nope");
    }

    #[test]
    fn test_constructor_failure_is_creation_error() {
        let mut registry = HandlerRegistry::new();
        registry.register("broken", |_| Err(AgentError::Configuration("missing key".into())));

        let err = registry.create("broken", &Request::new("x")).err().unwrap();
        assert!(err.to_string().contains("missing key"));
        assert!(matches!(err, AgentError::HandlerCreation { .. }));
    }

    #[tokio::test]
    async fn test_use_tools_without_access_is_empty() {
        let ctx = HandlerContext::detached("req");
        assert!(!ctx.has_tools());
        assert!(ctx.use_tools(&Request::new("x")).await.unwrap().is_empty());
    }
}
