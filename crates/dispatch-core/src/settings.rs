//! Router settings loaded from `dispatch.yaml`.
//!
//! ```yaml
//! router:
//!   confidence_threshold: 0.6
//!   max_concurrency: 4
//!   merge_strategy: concatenate
//! model:
//!   model: anthropic/claude-sonnet-4
//! capabilities:
//!   - id: translator
//!     kind: agent
//!     description: Translates text between languages
//!     system_prompt: You are a careful translator.
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use dispatch_models::{CapabilityDescriptor, CapabilityKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Override for [`RouterConfig::confidence_threshold`].
pub const CONFIDENCE_THRESHOLD_ENV: &str = "DISPATCH_CONFIDENCE_THRESHOLD";
/// Override for [`RouterConfig::max_concurrency`].
pub const MAX_CONCURRENCY_ENV: &str = "DISPATCH_MAX_CONCURRENCY";
/// Override for [`RouterConfig::per_call_timeout_ms`].
pub const TIMEOUT_MS_ENV: &str = "DISPATCH_TIMEOUT_MS";
/// Override for [`RouterConfig::merge_strategy`].
pub const MERGE_STRATEGY_ENV: &str = "DISPATCH_MERGE_STRATEGY";
/// Override for [`ModelSettings::model`].
pub const MODEL_ENV: &str = "DISPATCH_MODEL";

/// How successful results are merged into one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Highest-confidence successful result wins.
    #[default]
    BestOf,
    /// All successful results, highest confidence first.
    Concatenate,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BestOf => write!(f, "best_of"),
            Self::Concatenate => write!(f, "concatenate"),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "best_of" | "best" => Ok(Self::BestOf),
            "concatenate" | "concat" => Ok(Self::Concatenate),
            other => Err(format!("unknown merge strategy: {}", other)),
        }
    }
}

/// Routing behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Agents must score strictly above this to be selected.
    pub confidence_threshold: f64,
    /// Tools must score strictly above this to be run by an agent.
    pub tool_confidence_threshold: f64,
    /// Upper bound on agents dispatched for one request.
    pub max_agents: usize,
    /// Upper bound on handlers running at once in parallel mode.
    pub max_concurrency: usize,
    /// Per-handler timeout.
    pub per_call_timeout_ms: u64,
    /// Optional deadline for the whole execution phase.
    pub request_deadline_ms: Option<u64>,
    pub merge_strategy: MergeStrategy,
    /// Agent used when selection yields nothing.
    pub default_agent: String,
    /// Pass conversation history to tool selection.
    pub include_history_in_tool_selection: bool,
    /// Let agents select and run tools.
    pub enable_tools: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            tool_confidence_threshold: 0.5,
            max_agents: 3,
            max_concurrency: 3,
            per_call_timeout_ms: 30_000,
            request_deadline_ms: None,
            merge_strategy: MergeStrategy::BestOf,
            default_agent: "general".to_string(),
            include_history_in_tool_selection: true,
            enable_tools: true,
        }
    }
}

impl RouterConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the agent threshold, clamped to [0, 1].
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = clamp_unit(threshold);
        self
    }

    /// Sets the tool threshold, clamped to [0, 1].
    pub fn with_tool_confidence_threshold(mut self, threshold: f64) -> Self {
        self.tool_confidence_threshold = clamp_unit(threshold);
        self
    }

    pub fn with_max_agents(mut self, max: usize) -> Self {
        self.max_agents = max.max(1);
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_per_call_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_request_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.request_deadline_ms = deadline.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn with_default_agent(mut self, id: impl Into<String>) -> Self {
        self.default_agent = id.into();
        self
    }

    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.enable_tools = enabled;
        self
    }

    pub fn with_history_in_tool_selection(mut self, include: bool) -> Self {
        self.include_history_in_tool_selection = include;
        self
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn request_deadline(&self) -> Option<Duration> {
        self.request_deadline_ms.map(Duration::from_millis)
    }

    /// Bring values loaded from file back into their valid ranges.
    fn normalize(&mut self) {
        self.confidence_threshold = clamp_unit(self.confidence_threshold);
        self.tool_confidence_threshold = clamp_unit(self.tool_confidence_threshold);
        self.max_agents = self.max_agents.max(1);
        self.max_concurrency = self.max_concurrency.max(1);
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Generation model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Model identifier (e.g., "anthropic/claude-sonnet-4").
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4".into(),
            max_tokens: 4096,
            temperature: 0.2,
        }
    }
}

/// A capability declared in settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub id: String,
    pub description: String,
    pub kind: CapabilityKind,
    /// System prompt for generation-backed agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_true")]
    pub independent: bool,
}

fn default_true() -> bool {
    true
}

impl CapabilitySpec {
    pub fn agent(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            kind: CapabilityKind::Agent,
            system_prompt: None,
            independent: true,
        }
    }

    pub fn tool(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: CapabilityKind::Tool,
            ..Self::agent(id, description)
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Descriptor with zeroed counters.
    pub fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(&self.id, &self.description, self.kind)
            .with_independent(self.independent)
    }
}

/// Capabilities available when settings declare none.
pub fn default_capabilities() -> Vec<CapabilitySpec> {
    vec![
        CapabilitySpec::agent(
            "general",
            "General-purpose assistant for questions and conversation",
        ),
        CapabilitySpec::agent(
            "translator",
            "Translates text between natural languages",
        )
        .with_system_prompt(
            "You are a translator. Translate the user's text faithfully \
             and reply with the translation only.",
        ),
        CapabilitySpec::agent(
            "summarizer",
            "Summarizes long passages into short, accurate overviews",
        )
        .with_system_prompt("You summarize text concisely without adding facts."),
        CapabilitySpec::agent(
            "coder",
            "Writes, explains and debugs source code",
        )
        .with_system_prompt("You are an experienced software engineer. Answer with working code."),
        CapabilitySpec::tool("current_time", "Returns the current UTC date and time"),
        CapabilitySpec::tool("word_count", "Counts the words in the request prompt"),
    ]
}

/// Top-level settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<CapabilitySpec>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            model: ModelSettings::default(),
            capabilities: default_capabilities(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parse settings from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut settings: Settings =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                path: Default::default(),
                message: e.to_string(),
            })?;
        settings.router.normalize();
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `DISPATCH_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(CONFIDENCE_THRESHOLD_ENV) {
            let parsed = parse_override::<f64>(CONFIDENCE_THRESHOLD_ENV, &value)?;
            self.router.confidence_threshold = clamp_unit(parsed);
        }
        if let Some(value) = lookup(MAX_CONCURRENCY_ENV) {
            let parsed = parse_override::<usize>(MAX_CONCURRENCY_ENV, &value)?;
            self.router.max_concurrency = parsed.max(1);
        }
        if let Some(value) = lookup(TIMEOUT_MS_ENV) {
            self.router.per_call_timeout_ms = parse_override(TIMEOUT_MS_ENV, &value)?;
        }
        if let Some(value) = lookup(MERGE_STRATEGY_ENV) {
            self.router.merge_strategy = parse_override(MERGE_STRATEGY_ENV, &value)?;
        }
        if let Some(value) = lookup(MODEL_ENV) {
            if !value.trim().is_empty() {
                self.model.model = value.trim().to_string();
            }
        }
        Ok(())
    }

    /// Check that capability IDs are unique and the default agent exists.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for spec in &self.capabilities {
            if spec.id.trim().is_empty() {
                return Err(ConfigError::Invalid("capability with empty id".into()));
            }
            if !seen.insert(spec.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate capability id: {}",
                    spec.id
                )));
            }
        }

        let has_default = self
            .capabilities
            .iter()
            .any(|c| c.id == self.router.default_agent && c.kind == CapabilityKind::Agent);
        if !has_default {
            return Err(ConfigError::Invalid(format!(
                "default agent '{}' is not a declared agent",
                self.router.default_agent
            )));
        }
        Ok(())
    }
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            key: key.to_string(),
            value: value.to_string(),
        })
}
