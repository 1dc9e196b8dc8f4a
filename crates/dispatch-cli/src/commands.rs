//! Command handlers for CLI subcommands.

use std::sync::Arc;

use dispatch_agent::OpenRouterClient;
use dispatch_core::{Layout, Settings};
use dispatch_metrics::{last_days, MetricsReport, RequestSummary};
use dispatch_models::{CapabilityKind, Message, MessageRole, Request, RequestMetricsRecord};
use dispatch_orchestrator::Orchestrator;
use dispatch_persistence::{FileMetricsStore, MetricsStore};
use serde_json::json;
use tracing::{debug, info};

use crate::cli::{Commands, MetricsCommands};
use crate::error::{CliError, Result};

/// Load settings for `layout`: the YAML file, then env overrides.
pub fn load_settings(layout: &Layout) -> Result<Settings> {
    let mut settings = Settings::load(&layout.settings_file())?;
    settings.apply_env_overrides()?;
    debug!(
        capabilities = settings.capabilities.len(),
        model = %settings.model.model,
        "settings loaded"
    );
    Ok(settings)
}

/// Execute a CLI command.
pub async fn execute(command: Commands, layout: &Layout) -> Result<()> {
    let settings = load_settings(layout)?;

    match command {
        Commands::Ask { prompt, history } => cmd_ask(layout, &settings, prompt, &history).await,
        Commands::Capabilities { json } => cmd_capabilities(&settings, json),
        Commands::Metrics { command } => {
            let store = FileMetricsStore::new(layout.metrics_dir())?;
            cmd_metrics(&store, command)
        }
    }
}

async fn cmd_ask(
    layout: &Layout,
    settings: &Settings,
    prompt: String,
    history: &[String],
) -> Result<()> {
    layout.ensure_all()?;

    let generator = Arc::new(OpenRouterClient::from_env(settings.model.clone())?);
    let orchestrator = Orchestrator::from_settings(settings, layout, generator)?;

    let request = Request::new(prompt).with_history(parse_history(history));
    info!(request_id = %request.id, "routing request");

    let response = orchestrator.process(request).await?;
    orchestrator.metrics().flush().await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Turns "role: text" entries into messages; untagged entries are user turns.
pub fn parse_history(entries: &[String]) -> Vec<Message> {
    entries
        .iter()
        .map(|entry| {
            let (role, content) = match entry.split_once(':') {
                Some((tag, rest)) => match tag.trim().to_lowercase().as_str() {
                    "user" => (MessageRole::User, rest.trim()),
                    "assistant" => (MessageRole::Assistant, rest.trim()),
                    "system" => (MessageRole::System, rest.trim()),
                    _ => (MessageRole::User, entry.as_str()),
                },
                None => (MessageRole::User, entry.as_str()),
            };
            Message::new(role, content)
        })
        .collect()
}

fn cmd_capabilities(settings: &Settings, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&settings.capabilities)?);
        return Ok(());
    }

    for kind in [CapabilityKind::Agent, CapabilityKind::Tool] {
        let specs: Vec<_> = settings.capabilities.iter().filter(|c| c.kind == kind).collect();
        if specs.is_empty() {
            continue;
        }
        println!("{}s:", kind);
        for spec in specs {
            let marker = if spec.id == settings.router.default_agent { " (default)" } else { "" };
            println!("  {:<16} {}{}", spec.id, spec.description, marker);
        }
    }
    Ok(())
}

/// Run a metrics report against `store`.
pub fn cmd_metrics(store: &dyn MetricsStore, command: MetricsCommands) -> Result<()> {
    let output = match command {
        MetricsCommands::Summary { days } => {
            let records = records_for(store, days)?;
            json!({ "days": days, "summary": RequestSummary::build(&records) })
        }
        MetricsCommands::Agents { days, agent } => {
            let records = records_for(store, days)?;
            let report = MetricsReport::build(&records, CapabilityKind::Agent, agent.as_deref());
            json!({ "days": days, "report": report })
        }
        MetricsCommands::Tools { days, tool } => {
            let records = records_for(store, days)?;
            let report = MetricsReport::build(&records, CapabilityKind::Tool, tool.as_deref());
            json!({ "days": days, "report": report })
        }
        MetricsCommands::Request { id } => {
            let record = store.load(&id)?.ok_or(CliError::RequestNotFound(id))?;
            serde_json::to_value(record)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn records_for(store: &dyn MetricsStore, days: u32) -> Result<Vec<RequestMetricsRecord>> {
    let (start, end) = last_days(days);
    let records = store.list_range(start, end)?;
    debug!(records = records.len(), days, "metrics records loaded");
    Ok(records)
}
