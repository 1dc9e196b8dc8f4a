//! Built-in agents and tools.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use dispatch_core::CapabilitySpec;
use dispatch_models::{CapabilityKind, ExecutionResult, Request};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::Result;
use crate::generator::{estimate_tokens, Generator};
use crate::handler::{Handler, HandlerContext, HandlerRegistry};

/// Generation-backed agent: system prompt, history, tool output, prompt.
pub struct PromptAgent {
    id: String,
    system_prompt: Option<String>,
    generator: Arc<dyn Generator>,
}

impl PromptAgent {
    pub fn new(id: impl Into<String>, generator: Arc<dyn Generator>) -> Self {
        Self {
            id: id.into(),
            system_prompt: None,
            generator,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    fn compose(&self, request: &Request, tool_results: &[ExecutionResult]) -> String {
        let mut prompt = String::new();

        if let Some(system) = &self.system_prompt {
            prompt.push_str(system);
            prompt.push_str("\n\n");
        }

        if !request.conversation_history.is_empty() {
            prompt.push_str("Conversation so far:\n");
            prompt.push_str(&request.history_text());
            prompt.push_str("\n\n");
        }

        let useful: Vec<_> = tool_results.iter().filter(|r| r.is_success()).collect();
        if !useful.is_empty() {
            prompt.push_str("Tool results:\n");
            for result in useful {
                prompt.push_str(&format!(
                    "- {}: {}\n",
                    result.capability_id,
                    result.content_text()
                ));
            }
            prompt.push('\n');
        }

        prompt.push_str("User: ");
        prompt.push_str(&request.prompt);
        prompt
    }
}

#[async_trait]
impl Handler for PromptAgent {
    async fn run(&self, request: &Request, ctx: &HandlerContext) -> Result<Value> {
        let tool_results = ctx.use_tools(request).await?;
        if !tool_results.is_empty() {
            debug!(agent = %self.id, tools = tool_results.len(), "tool results collected");
        }

        let prompt = self.compose(request, &tool_results);
        let started = Instant::now();
        let outcome = self.generator.generate(&prompt).await;

        ctx.track_model_usage(
            self.generator.model_id(),
            estimate_tokens(&prompt),
            outcome.as_ref().map_or(0, |text| estimate_tokens(text)),
            started.elapsed(),
            outcome.is_ok(),
        );

        Ok(Value::String(outcome?))
    }
}

/// Current UTC time as RFC 3339.
pub struct CurrentTimeTool;

#[async_trait]
impl Handler for CurrentTimeTool {
    async fn run(&self, _request: &Request, _ctx: &HandlerContext) -> Result<Value> {
        Ok(json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)))
    }
}

/// Word count of the request prompt.
pub struct WordCountTool;

#[async_trait]
impl Handler for WordCountTool {
    async fn run(&self, request: &Request, _ctx: &HandlerContext) -> Result<Value> {
        Ok(json!({ "words": request.prompt.split_whitespace().count() }))
    }
}

fn builtin_tool(id: &str) -> Option<Arc<dyn Handler>> {
    match id {
        "current_time" => Some(Arc::new(CurrentTimeTool)),
        "word_count" => Some(Arc::new(WordCountTool)),
        _ => None,
    }
}

/// Handlers for the configured capabilities.
///
/// Every agent becomes a [`PromptAgent`]. Tools resolve to built-ins by ID;
/// a configured tool without an implementation is left unregistered, so
/// invoking it yields a handler-creation error.
pub fn builtin_handlers(
    specs: &[CapabilitySpec],
    generator: Arc<dyn Generator>,
) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();

    for spec in specs {
        match spec.kind {
            CapabilityKind::Agent => {
                let mut agent = PromptAgent::new(&spec.id, Arc::clone(&generator));
                if let Some(system) = &spec.system_prompt {
                    agent = agent.with_system_prompt(system);
                }
                handlers.register_shared(&spec.id, Arc::new(agent));
            }
            CapabilityKind::Tool => match builtin_tool(&spec.id) {
                Some(tool) => handlers.register_shared(&spec.id, tool),
                None => warn!(capability_id = %spec.id, "no built-in implementation for tool"),
            },
        }
    }

    handlers
}
