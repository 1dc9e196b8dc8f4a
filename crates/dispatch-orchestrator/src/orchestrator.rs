//! Request routing façade.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dispatch_agent::{
    builtin_handlers, record_results, CapabilityRegistry, ConfidenceSelector, Generator,
    HandlerContext, HandlerFactory, ToolAccess,
};
use dispatch_core::{Layout, RouterConfig, Settings};
use dispatch_metrics::{MetricsHandle, MetricsRecorder};
use dispatch_models::{
    Candidate, CapabilityDescriptor, CapabilityKind, ExecutionMode, Request, Response,
};
use dispatch_persistence::{FileMetricsStore, MemoryMetricsStore, MetricsStore};
use dispatch_runtime::{CoordinatorConfig, ExecutionCoordinator};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::aggregator::{MergePolicy, ResponseAggregator};
use crate::error::{OrchestratorError, Result};
use crate::use_case::{UseCase, USE_CASE_KEY};

/// Stages of one routing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    AgentsSelected,
    Executing,
    Aggregated,
    Complete,
    Failed,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::AgentsSelected => "agents_selected",
            Self::Executing => "executing",
            Self::Aggregated => "aggregated",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(request_id: &str, phase: RequestPhase) {
    debug!(request_id = %request_id, phase = %phase, "request phase");
}

/// Routes requests to agents and merges their answers.
pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    selector: Arc<ConfidenceSelector>,
    coordinator: Arc<ExecutionCoordinator>,
    aggregator: ResponseAggregator,
    metrics: MetricsHandle,
    router: RouterConfig,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("capabilities", &self.registry.len())
            .field("aggregator", &self.aggregator)
            .field("router", &self.router)
            .finish()
    }
}

impl Orchestrator {
    pub fn builder(generator: Arc<dyn Generator>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(generator)
    }

    /// Orchestrator from settings, with built-in handlers and metrics
    /// persisted under the layout's metrics directory.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn from_settings(
        settings: &Settings,
        layout: &Layout,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        info!(state_dir = %layout.root().display(), "initializing orchestrator");

        let store = FileMetricsStore::new(layout.metrics_dir())?;
        let handlers = builtin_handlers(&settings.capabilities, Arc::clone(&generator));

        Self::builder(generator)
            .router(settings.router.clone())
            .descriptors(settings.capabilities.iter().map(|c| c.descriptor()).collect())
            .handlers(Arc::new(handlers))
            .metrics_store(Arc::new(store))
            .build()
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    pub fn router_config(&self) -> &RouterConfig {
        &self.router
    }

    /// Route `request` and return the merged response.
    ///
    /// Only infrastructure failures are returned as errors; every other
    /// problem is reported inside the response.
    pub async fn process(&self, request: Request) -> Result<Response> {
        enter(&request.id, RequestPhase::Received);
        let use_case = UseCase::detect(&request);

        let mut record_metadata = request.metadata.clone();
        record_metadata.insert(USE_CASE_KEY.to_string(), json!(use_case.as_str()));
        self.metrics
            .start_request_with_id(&request.id, &request.prompt, record_metadata);

        let agents = match self.registry.list(CapabilityKind::Agent) {
            Ok(agents) => agents,
            Err(e) => return Err(self.fail(&request, e.into())),
        };

        let (candidates, fallback) = self.select_agents(&request, &agents).await;
        enter(&request.id, RequestPhase::AgentsSelected);

        let mode = execution_mode(&candidates, &agents);
        enter(&request.id, RequestPhase::Executing);
        let ctx = self.handler_context(&request);
        let results = self.coordinator.execute(&request, &candidates, mode, &ctx).await;
        record_results(
            Some(&self.metrics),
            &self.registry,
            &request.id,
            CapabilityKind::Agent,
            &results,
        );

        let agents_used: Vec<&str> = candidates.iter().map(|c| c.capability_id.as_str()).collect();
        let response = self
            .aggregator
            .aggregate(&results)
            .with_metadata("request_id", json!(request.id))
            .with_metadata("agents_used", json!(agents_used))
            .with_metadata("execution_mode", json!(mode.to_string()))
            .with_metadata("fallback", json!(fallback))
            .with_metadata(USE_CASE_KEY, json!(use_case.as_str()));
        enter(&request.id, RequestPhase::Aggregated);

        if response.is_success() {
            self.metrics.end_request(&request.id, true);
        } else {
            let reason = response.content.as_str().unwrap_or("request failed").to_string();
            self.metrics.end_request_with_error(&request.id, reason);
        }
        enter(&request.id, RequestPhase::Complete);

        info!(
            request_id = %request.id,
            agents = agents_used.len(),
            success = response.is_success(),
            "request complete"
        );
        Ok(response)
    }

    /// Selected agents, or the default agent when nothing applies.
    async fn select_agents(
        &self,
        request: &Request,
        agents: &[CapabilityDescriptor],
    ) -> (Vec<Candidate>, bool) {
        let mut selected = self
            .selector
            .select(request, agents, self.router.confidence_threshold, false)
            .await;

        if selected.is_empty() {
            info!(
                request_id = %request.id,
                agent = %self.router.default_agent,
                "no agent selected, using default"
            );
            return (vec![Candidate::new(&self.router.default_agent, 1.0)], true);
        }

        if selected.len() > self.router.max_agents {
            let dropped: Vec<_> = selected
                .drain(self.router.max_agents..)
                .map(|c| c.capability_id)
                .collect();
            debug!(request_id = %request.id, ?dropped, "agent cap reached");
        }
        (selected, false)
    }

    fn handler_context(&self, request: &Request) -> HandlerContext {
        let ctx = HandlerContext::new(&request.id, Some(self.metrics.clone()));
        if !self.router.enable_tools {
            return ctx;
        }

        ctx.with_tools(ToolAccess {
            selector: Arc::clone(&self.selector),
            registry: Arc::clone(&self.registry),
            dispatcher: self.coordinator.clone(),
            threshold: self.router.tool_confidence_threshold,
            include_history: self.router.include_history_in_tool_selection,
        })
    }

    fn fail(&self, request: &Request, err: OrchestratorError) -> OrchestratorError {
        enter(&request.id, RequestPhase::Failed);
        error!(request_id = %request.id, error = %err, "request failed");
        self.metrics.end_request_with_error(&request.id, err.to_string());
        err
    }
}

/// Parallel only for several candidates that are all independent.
fn execution_mode(candidates: &[Candidate], agents: &[CapabilityDescriptor]) -> ExecutionMode {
    let all_independent = candidates.iter().all(|c| {
        agents
            .iter()
            .find(|d| d.id == c.capability_id)
            .is_some_and(|d| d.independent)
    });

    if candidates.len() > 1 && all_independent {
        ExecutionMode::Parallel
    } else {
        ExecutionMode::Sequential
    }
}

/// Assembles an [`Orchestrator`].
pub struct OrchestratorBuilder {
    generator: Arc<dyn Generator>,
    router: RouterConfig,
    descriptors: Vec<CapabilityDescriptor>,
    handlers: Option<Arc<dyn HandlerFactory>>,
    metrics_store: Option<Arc<dyn MetricsStore>>,
    policy: Option<Arc<dyn MergePolicy>>,
    selection_timeout: Option<Duration>,
}

impl OrchestratorBuilder {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            router: RouterConfig::default(),
            descriptors: Vec::new(),
            handlers: None,
            metrics_store: None,
            policy: None,
            selection_timeout: None,
        }
    }

    pub fn router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    pub fn descriptors(mut self, descriptors: Vec<CapabilityDescriptor>) -> Self {
        self.descriptors = descriptors;
        self
    }

    pub fn descriptor(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn handlers(mut self, handlers: Arc<dyn HandlerFactory>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Defaults to an in-memory store.
    pub fn metrics_store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.metrics_store = Some(store);
        self
    }

    /// Overrides the configured merge strategy.
    pub fn merge_policy(mut self, policy: Arc<dyn MergePolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Defaults to the per-call timeout.
    pub fn selection_timeout(mut self, timeout: Duration) -> Self {
        self.selection_timeout = Some(timeout);
        self
    }

    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<Orchestrator> {
        let registry = CapabilityRegistry::from_descriptors(self.descriptors)
            .map_err(|e| OrchestratorError::Configuration(e.to_string()))?;
        let handlers = self
            .handlers
            .ok_or_else(|| OrchestratorError::Configuration("no handler factory".to_string()))?;

        if !registry.contains(&self.router.default_agent)? {
            warn!(agent = %self.router.default_agent, "default agent is not registered");
        }

        let store = self
            .metrics_store
            .unwrap_or_else(|| Arc::new(MemoryMetricsStore::new()));
        let metrics = MetricsRecorder::spawn(store);

        let selector = ConfidenceSelector::new(self.generator)
            .with_metrics(metrics.clone())
            .with_timeout(self.selection_timeout.unwrap_or(self.router.per_call_timeout()));
        let coordinator =
            ExecutionCoordinator::new(handlers, CoordinatorConfig::from_router(&self.router));
        let aggregator = match self.policy {
            Some(policy) => ResponseAggregator::new(policy),
            None => ResponseAggregator::from_strategy(self.router.merge_strategy),
        };

        Ok(Orchestrator {
            registry: Arc::new(registry),
            selector: Arc::new(selector),
            coordinator: Arc::new(coordinator),
            aggregator,
            metrics,
            router: self.router,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_agent::{AgentError, Handler, HandlerRegistry};
    use serde_json::Value;

    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl Generator for Fixed {
        fn model_id(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &str) -> dispatch_agent::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Reply(&'static str);

    #[async_trait::async_trait]
    impl Handler for Reply {
        async fn run(
            &self,
            _request: &Request,
            _ctx: &HandlerContext,
        ) -> dispatch_agent::Result<Value> {
            Ok(json!(self.0))
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl Handler for Broken {
        async fn run(
            &self,
            _request: &Request,
            _ctx: &HandlerContext,
        ) -> dispatch_agent::Result<Value> {
            Err(AgentError::Execution {
                capability_id: "general".into(),
                message: "down".into(),
            })
        }
    }

    fn handlers() -> HandlerRegistry {
        let mut handlers = HandlerRegistry::new();
        handlers.register_shared("general", Arc::new(Reply("general answer")));
        handlers.register_shared("a", Arc::new(Reply("from a")));
        handlers.register_shared("b", Arc::new(Reply("from b")));
        handlers.register_shared("c", Arc::new(Reply("from c")));
        handlers
    }

    fn orchestrator(reply: &'static str, router: RouterConfig) -> Orchestrator {
        Orchestrator::builder(Arc::new(Fixed(reply)))
            .router(router.with_tools_enabled(false))
            .descriptor(CapabilityDescriptor::agent("general", "fallback"))
            .descriptor(CapabilityDescriptor::agent("a", "first"))
            .descriptor(CapabilityDescriptor::agent("b", "second"))
            .descriptor(CapabilityDescriptor::agent("c", "third").with_independent(false))
            .handlers(Arc::new(handlers()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_execution_mode_rule() {
        let agents = vec![
            CapabilityDescriptor::agent("a", "x"),
            CapabilityDescriptor::agent("b", "y"),
            CapabilityDescriptor::agent("c", "z").with_independent(false),
        ];
        let pick = |ids: &[&str]| -> Vec<Candidate> {
            ids.iter().map(|id| Candidate::new(*id, 0.9)).collect()
        };

        assert_eq!(execution_mode(&pick(&["a"]), &agents), ExecutionMode::Sequential);
        assert_eq!(execution_mode(&pick(&["a", "b"]), &agents), ExecutionMode::Parallel);
        assert_eq!(execution_mode(&pick(&["a", "c"]), &agents), ExecutionMode::Sequential);
    }

    #[tokio::test]
    async fn test_agent_cap() {
        let orchestrator = orchestrator(
            r#"[["a", 0.9], ["b", 0.8], ["general", 0.7]]"#,
            RouterConfig::new().with_max_agents(2),
        );

        let response = orchestrator.process(Request::new("hello")).await.unwrap();

        assert_eq!(response.metadata["agents_used"], json!(["a", "b"]));
        assert_eq!(response.metadata["execution_mode"], json!("parallel"));
        assert_eq!(response.content, json!("from a"));
    }

    #[tokio::test]
    async fn test_dependent_agent_runs_sequentially() {
        let orchestrator = orchestrator(r#"[["a", 0.9], ["c", 0.8]]"#, RouterConfig::new());

        let response = orchestrator.process(Request::new("hello")).await.unwrap();
        assert_eq!(response.metadata["execution_mode"], json!("sequential"));
    }

    #[tokio::test]
    async fn test_response_metadata() {
        let orchestrator = orchestrator("[]", RouterConfig::new());
        let request = Request::new("summarize this").with_id("req-42");

        let response = orchestrator.process(request).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.metadata["request_id"], json!("req-42"));
        assert_eq!(response.metadata["fallback"], json!(true));
        assert_eq!(response.metadata["use_case"], json!("summarization"));
        assert_eq!(response.content, json!("general answer"));
    }

    #[tokio::test]
    async fn test_failed_default_agent_is_error_response() {
        let mut handlers = HandlerRegistry::new();
        handlers.register_shared("general", Arc::new(Broken));
        let orchestrator = Orchestrator::builder(Arc::new(Fixed("nonsense")))
            .descriptor(CapabilityDescriptor::agent("general", "fallback"))
            .handlers(Arc::new(handlers))
            .build()
            .unwrap();
        let request = Request::new("hi");
        let id = request.id.clone();

        let response = orchestrator.process(request).await.unwrap();
        assert!(!response.is_success());

        orchestrator.metrics().flush().await;
        let record = orchestrator.metrics().snapshot(&id).await.unwrap();
        assert!(!record.success);
        assert!(record.error.unwrap().contains("down"));
    }

    #[tokio::test]
    async fn test_build_requires_handlers() {
        let err = Orchestrator::builder(Arc::new(Fixed("[]"))).build().unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_build_rejects_duplicate_descriptors() {
        let err = Orchestrator::builder(Arc::new(Fixed("[]")))
            .descriptor(CapabilityDescriptor::agent("general", "a"))
            .descriptor(CapabilityDescriptor::agent("general", "b"))
            .handlers(Arc::new(HandlerRegistry::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_from_settings_uses_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::fixed(dir.path());
        let settings = Settings::default();

        let orchestrator =
            Orchestrator::from_settings(&settings, &layout, Arc::new(Fixed("[]"))).unwrap();

        assert_eq!(orchestrator.registry().len(), settings.capabilities.len());
        assert!(layout.metrics_dir().join("requests").is_dir());
    }
}
