//! End-to-end routing scenarios.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dispatch_agent::{
    Generator, Handler, HandlerContext, HandlerRegistry, PromptAgent, Result, WordCountTool,
};
use dispatch_core::{MergeStrategy, RouterConfig};
use dispatch_models::{CapabilityDescriptor, Request, ResponseStatus};
use dispatch_orchestrator::Orchestrator;
use dispatch_persistence::{FileMetricsStore, MetricsStore};
use serde_json::{json, Value};

/// Answers by the kind of prompt it receives.
struct Scripted {
    agents: &'static str,
    tools: &'static str,
    answer: &'static str,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(agents: &'static str) -> Self {
        Self {
            agents,
            tools: "[]",
            answer: "generated answer",
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn with_tools(mut self, tools: &'static str) -> Self {
        self.tools = tools;
        self
    }
}

#[async_trait]
impl Generator for Scripted {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = if prompt.contains("Available agents") {
            self.agents
        } else if prompt.contains("Available tools") {
            self.tools
        } else {
            self.answer
        };
        Ok(reply.to_string())
    }
}

struct Reply {
    content: &'static str,
    delay: Duration,
}

#[async_trait]
impl Handler for Reply {
    async fn run(&self, _request: &Request, _ctx: &HandlerContext) -> Result<Value> {
        tokio::time::sleep(self.delay).await;
        Ok(json!(self.content))
    }
}

fn reply(content: &'static str) -> Arc<Reply> {
    Arc::new(Reply {
        content,
        delay: Duration::ZERO,
    })
}

fn translation_setup(generator: Arc<Scripted>) -> Orchestrator {
    let mut handlers = HandlerRegistry::new();
    handlers.register_shared("translator", reply("bonjour"));
    handlers.register_shared("weather", reply("sunny"));
    handlers.register_shared("general", reply("general answer"));

    Orchestrator::builder(generator)
        .descriptor(CapabilityDescriptor::agent("general", "general-purpose assistant"))
        .descriptor(CapabilityDescriptor::agent("translator", "translates text"))
        .descriptor(CapabilityDescriptor::agent("weather", "gets weather"))
        .handlers(Arc::new(handlers))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_translation_request_routes_to_translator() {
    let orchestrator = translation_setup(Arc::new(Scripted::new(
        r#"[["translator", 0.9], ["weather", 0.1]]"#,
    )));
    let request = Request::new("translate hello to french");
    let id = request.id.clone();

    let response = orchestrator.process(request).await.unwrap();

    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(response.content, json!("bonjour"));
    assert_eq!(response.metadata["agents_used"], json!(["translator"]));
    assert_eq!(response.metadata["use_case"], json!("translation"));

    orchestrator.metrics().flush().await;
    let record = orchestrator.metrics().snapshot(&id).await.unwrap();
    assert!(record.success);
    assert!(record.is_finalized());
    assert!(record.end_time.unwrap() >= record.start_time);
    assert_eq!(record.agent_usages.len(), 1);
    assert_eq!(record.agent_usages[0].capability_id, "translator");
    assert_eq!(record.agent_usages[0].confidence, Some(0.9));
    assert!(record.agent_usages[0].success);
    assert_eq!(record.model_usages.len(), 1);
    assert_eq!(record.metadata["use_case"], json!("translation"));

    let translator = orchestrator.registry().get("translator").unwrap();
    assert_eq!((translator.usage_count, translator.success_count), (1, 1));
    assert_eq!(orchestrator.registry().get("weather").unwrap().usage_count, 0);
}

#[tokio::test]
async fn test_malformed_selection_falls_back_to_default() {
    let orchestrator = translation_setup(Arc::new(Scripted::new(
        "Honestly, any of them could work.",
    )));

    let response = orchestrator.process(Request::new("tell me a joke")).await.unwrap();

    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(response.content, json!("general answer"));
    assert_eq!(response.metadata["agents_used"], json!(["general"]));
    assert_eq!(response.metadata["fallback"], json!(true));
}

#[tokio::test]
async fn test_hallucinated_agents_are_ignored() {
    let orchestrator = translation_setup(Arc::new(Scripted::new(
        r#"[["oracle", 0.99], ["weather", 0.7]]"#,
    )));

    let response = orchestrator.process(Request::new("weather in Paris?")).await.unwrap();

    assert_eq!(response.content, json!("sunny"));
    assert_eq!(response.metadata["agents_used"], json!(["weather"]));
}

#[tokio::test]
async fn test_agent_runs_selected_tools() {
    let generator = Arc::new(
        Scripted::new(r#"[["general", 0.9]]"#)
            .with_tools(r#"[["word_count", 0.8], ["current_time", 0.2]]"#),
    );

    let mut handlers = HandlerRegistry::new();
    handlers.register_shared("general", Arc::new(PromptAgent::new("general", generator.clone())));
    handlers.register_shared("word_count", Arc::new(WordCountTool));

    let orchestrator = Orchestrator::builder(generator.clone())
        .descriptor(CapabilityDescriptor::agent("general", "general assistant"))
        .descriptor(CapabilityDescriptor::tool("word_count", "counts words"))
        .descriptor(CapabilityDescriptor::tool("current_time", "current time"))
        .handlers(Arc::new(handlers))
        .build()
        .unwrap();
    let request = Request::new("how many words are in this sentence");
    let id = request.id.clone();

    let response = orchestrator.process(request).await.unwrap();

    assert!(response.is_success());
    assert_eq!(response.content, json!("generated answer"));

    let prompts = generator.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[2].contains("word_count: {\"words\":7}"));

    orchestrator.metrics().flush().await;
    let record = orchestrator.metrics().snapshot(&id).await.unwrap();
    assert_eq!(record.tool_usages.len(), 1);
    assert_eq!(record.tool_usages[0].capability_id, "word_count");
    assert_eq!(record.model_usages.len(), 3);
    assert_eq!(orchestrator.registry().get("word_count").unwrap().success_count, 1);
}

#[tokio::test]
async fn test_tools_disabled_skips_tool_selection() {
    let generator =
        Arc::new(Scripted::new(r#"[["general", 0.9]]"#).with_tools(r#"[["word_count", 0.8]]"#));

    let mut handlers = HandlerRegistry::new();
    handlers.register_shared("general", Arc::new(PromptAgent::new("general", generator.clone())));
    handlers.register_shared("word_count", Arc::new(WordCountTool));

    let orchestrator = Orchestrator::builder(generator.clone())
        .router(RouterConfig::new().with_tools_enabled(false))
        .descriptor(CapabilityDescriptor::agent("general", "general assistant"))
        .descriptor(CapabilityDescriptor::tool("word_count", "counts words"))
        .handlers(Arc::new(handlers))
        .build()
        .unwrap();

    let response = orchestrator.process(Request::new("count words")).await.unwrap();

    assert!(response.is_success());
    assert_eq!(generator.prompts.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_agent_times_out_without_sinking_request() {
    let mut handlers = HandlerRegistry::new();
    handlers.register_shared("fast", reply("fast answer"));
    handlers.register_shared(
        "slow",
        Arc::new(Reply {
            content: "too late",
            delay: Duration::from_secs(60),
        }),
    );

    let generator = Arc::new(Scripted::new(r#"[["slow", 0.95], ["fast", 0.7]]"#));
    let orchestrator = Orchestrator::builder(generator)
        .router(
            RouterConfig::new()
                .with_per_call_timeout(Duration::from_millis(200))
                .with_merge_strategy(MergeStrategy::Concatenate),
        )
        .descriptor(CapabilityDescriptor::agent("general", "fallback"))
        .descriptor(CapabilityDescriptor::agent("slow", "slow"))
        .descriptor(CapabilityDescriptor::agent("fast", "fast"))
        .handlers(Arc::new(handlers))
        .build()
        .unwrap();

    let request = Request::new("hi");
    let id = request.id.clone();
    let started = tokio::time::Instant::now();
    let response = orchestrator.process(request).await.unwrap();

    assert!(started.elapsed() <= Duration::from_millis(250));
    assert!(response.is_success());
    assert_eq!(response.content, json!("[fast] fast answer"));
    assert_eq!(response.metadata["execution_mode"], json!("parallel"));
    assert_eq!(orchestrator.registry().get("slow").unwrap().success_count, 0);

    orchestrator.metrics().flush().await;
    let record = orchestrator.metrics().snapshot(&id).await.unwrap();
    assert!(record.success);
    assert_eq!(record.agent_usages.len(), 2);
    let usage = |agent: &str| {
        record
            .agent_usages
            .iter()
            .find(|u| u.capability_id == agent)
            .cloned()
            .unwrap()
    };
    let slow = usage("slow");
    assert!(!slow.success);
    assert_eq!(slow.confidence, Some(0.95));
    assert_eq!(slow.metadata.unwrap()["status"], json!("timeout"));
    assert!(usage("fast").success);
}

#[tokio::test]
async fn test_finalized_record_is_persisted_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileMetricsStore::new(dir.path()).unwrap());

    let mut handlers = HandlerRegistry::new();
    handlers.register_shared("general", reply("ok"));
    let orchestrator = Orchestrator::builder(Arc::new(Scripted::new("[]")))
        .descriptor(CapabilityDescriptor::agent("general", "fallback"))
        .handlers(Arc::new(handlers))
        .metrics_store(store.clone())
        .build()
        .unwrap();

    let request = Request::new("hello there").with_id("persist-me");
    orchestrator.process(request).await.unwrap();
    orchestrator.metrics().end_request("persist-me", false);
    orchestrator.metrics().flush().await;

    let record = store.load("persist-me").unwrap().unwrap();
    assert!(record.success);
    assert_eq!(record.prompt, "hello there");
    assert_eq!(record.agent_usages.len(), 1);
    assert!(dir.path().join("requests").join("persist-me.json").exists());
}
