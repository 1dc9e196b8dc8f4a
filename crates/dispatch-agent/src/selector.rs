//! Confidence-based selection of agents and tools.
//!
//! The generation capability is asked once per selection to score every
//! candidate. Its answer is untrusted: output is parsed tolerantly, scores
//! are clipped, unknown IDs are discarded, and any failure yields an empty
//! selection rather than an error.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use dispatch_metrics::MetricsHandle;
use dispatch_models::{Candidate, CapabilityDescriptor, CapabilityKind, Request};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::generator::{estimate_tokens, Generator};

/// Keys accepted for a candidate's ID in object form.
const ID_KEYS: [&str; 4] = ["id", "capability_id", "agent_id", "name"];

/// Keys that may wrap the candidate list.
const LIST_KEYS: [&str; 3] = ["candidates", "agents", "tools"];

/// Scores capabilities for a request through the generation capability.
pub struct ConfidenceSelector {
    generator: Arc<dyn Generator>,
    metrics: Option<MetricsHandle>,
    timeout: Option<Duration>,
}

impl ConfidenceSelector {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            metrics: None,
            timeout: None,
        }
    }

    /// Record each selection call as a model usage.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Bound the generation call; expiry counts as a selection failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Score `descriptors` for `request`.
    ///
    /// Returns candidates scoring strictly above `threshold`, highest first,
    /// ties in `descriptors` order. An empty result means nothing applies.
    pub async fn select(
        &self,
        request: &Request,
        descriptors: &[CapabilityDescriptor],
        threshold: f64,
        include_history: bool,
    ) -> Vec<Candidate> {
        if descriptors.is_empty() {
            return Vec::new();
        }

        let prompt = build_prompt(request, descriptors, include_history);
        let started = Instant::now();
        let outcome = match self.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.generator.generate(&prompt)).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("selection timed out after {:?}", limit)),
                }
            }
            None => self.generator.generate(&prompt).await.map_err(|e| e.to_string()),
        };
        let elapsed = started.elapsed();

        self.track(request, &prompt, outcome.as_ref(), elapsed);

        let output = match outcome {
            Ok(output) => output,
            Err(error) => {
                warn!(
                    request_id = %request.id,
                    error = %error,
                    "selection failed: generation error"
                );
                return Vec::new();
            }
        };

        let Some(pairs) = parse_scores(&output) else {
            warn!(request_id = %request.id, "selection failed: unparseable output");
            debug!(request_id = %request.id, output = %output, "raw selection output");
            return Vec::new();
        };

        let candidates = rank(pairs, descriptors, threshold);
        debug!(
            request_id = %request.id,
            selected = candidates.len(),
            threshold,
            "selection complete"
        );
        candidates
    }

    fn track(
        &self,
        request: &Request,
        prompt: &str,
        outcome: Result<&String, &String>,
        elapsed: Duration,
    ) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        let (tokens_out, success, detail) = match outcome {
            Ok(output) => (estimate_tokens(output), true, json!({"purpose": "selection"})),
            Err(error) => (0, false, json!({"purpose": "selection", "error": error})),
        };
        metrics.track_model_usage(
            &request.id,
            self.generator.model_id(),
            estimate_tokens(prompt),
            tokens_out,
            elapsed,
            success,
            Some(detail),
        );
    }
}

fn build_prompt(
    request: &Request,
    descriptors: &[CapabilityDescriptor],
    include_history: bool,
) -> String {
    let noun = match descriptors.first().map(|d| d.kind) {
        Some(CapabilityKind::Tool) => "tools",
        _ => "agents",
    };

    let mut prompt = format!(
        "Rate how relevant each of the following {} is to the user's request.\n\nAvailable {}:\n",
        noun, noun
    );
    for descriptor in descriptors {
        prompt.push_str(&format!("- {}: {}\n", descriptor.id, descriptor.description));
    }

    if include_history && !request.conversation_history.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        prompt.push_str(&request.history_text());
        prompt.push('\n');
    }

    prompt.push_str(&format!("\nRequest: {}\n\n", request.prompt));
    prompt.push_str(
        "Respond with JSON only: a list of [id, confidence] pairs, confidence between 0 and 1, \
         for example [[\"some_id\", 0.8]]. Use only the ids listed above.",
    );
    prompt
}

/// Parse `(id, confidence)` pairs out of generation output.
///
/// `None` means the output could not be interpreted at all.
pub fn parse_scores(output: &str) -> Option<Vec<(String, f64)>> {
    let body = strip_fences(output);

    let parsed = serde_json::from_str::<Value>(body).ok();
    if let Some(pairs) = parsed.and_then(|v| pairs_from_value(&v)) {
        return Some(pairs);
    }

    // Prose around a JSON list.
    if let (Some(start), Some(end)) = (body.find('['), body.rfind(']')) {
        if start < end {
            if let Some(pairs) = serde_json::from_str::<Value>(&body[start..=end])
                .ok()
                .and_then(|v| pairs_from_value(&v))
            {
                return Some(pairs);
            }
        }
    }

    let pairs: Vec<(String, f64)> = pair_pattern()?
        .captures_iter(body)
        .filter_map(|c| Some((c[1].to_string(), c[2].parse().ok()?)))
        .collect();
    (!pairs.is_empty()).then_some(pairs)
}

/// Quoted `"id", 0.x` pairs.
fn pair_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"["']([\w.\-]+)["']\s*,\s*(\d+(?:\.\d+)?|\.\d+)"#).ok())
        .as_ref()
}

fn strip_fences(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };

    let after = &trimmed[open + 3..];
    // Skip a language tag on the fence line.
    let after = match after.find('\n') {
        Some(nl) if !after[..nl].contains('[') && !after[..nl].contains('{') => &after[nl + 1..],
        _ => after,
    };
    match after.find("```") {
        Some(close) => after[..close].trim(),
        None => after.trim(),
    }
}

fn pairs_from_value(value: &Value) -> Option<Vec<(String, f64)>> {
    match value {
        Value::Array(items) => {
            // `[]` is a valid "nothing applies"; a list of junk is not.
            let pairs: Vec<_> = items.iter().filter_map(pair_from_item).collect();
            (items.is_empty() || !pairs.is_empty()).then_some(pairs)
        }
        Value::Object(map) => {
            if let Some(inner) = LIST_KEYS.iter().find_map(|k| map.get(*k)) {
                return pairs_from_value(inner);
            }
            if let Some(pair) = pair_from_item(value) {
                return Some(vec![pair]);
            }
            // {"translator": 0.9, "weather": 0.1}
            let pairs: Vec<_> = map
                .iter()
                .filter_map(|(id, score)| Some((id.clone(), number(score)?)))
                .collect();
            (!pairs.is_empty()).then_some(pairs)
        }
        _ => None,
    }
}

fn pair_from_item(item: &Value) -> Option<(String, f64)> {
    match item {
        Value::Array(pair) if pair.len() >= 2 => {
            Some((pair[0].as_str()?.to_string(), number(&pair[1])?))
        }
        Value::Object(map) => {
            let id = ID_KEYS.iter().find_map(|k| map.get(*k)?.as_str())?;
            let confidence = number(map.get("confidence").or_else(|| map.get("score"))?)?;
            Some((id.to_string(), confidence))
        }
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Validate, threshold and order parsed pairs against the known descriptors.
fn rank(
    pairs: Vec<(String, f64)>,
    descriptors: &[CapabilityDescriptor],
    threshold: f64,
) -> Vec<Candidate> {
    let position: HashMap<&str, usize> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| (d.id.as_str(), i))
        .collect();

    let mut best: HashMap<&str, f64> = HashMap::new();
    for (id, confidence) in &pairs {
        if !confidence.is_finite() {
            continue;
        }
        let Some((&known, _)) = position.get_key_value(id.as_str()) else {
            debug!(capability_id = %id, "dropping unknown capability from selection");
            continue;
        };
        let confidence = confidence.clamp(0.0, 1.0);
        let slot = best.entry(known).or_insert(confidence);
        *slot = slot.max(confidence);
    }

    let mut ranked: Vec<(&str, f64)> = best.into_iter().filter(|(_, c)| *c > threshold).collect();
    ranked.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| position[a.0].cmp(&position[b.0]))
    });

    ranked
        .into_iter()
        .map(|(id, confidence)| Candidate::new(id, confidence))
        .collect()
}
