//! Merging execution results into one response.

use std::sync::Arc;

use dispatch_core::MergeStrategy;
use dispatch_models::{ExecutionResult, Response};
use serde_json::{json, Value};

/// Content of the response when nothing could be attempted.
pub const NO_CAPABILITY: &str = "no capability available";

/// Combines successful results into a response.
///
/// Only called with at least one successful result, in input order.
pub trait MergePolicy: Send + Sync {
    /// Name recorded in response metadata.
    fn name(&self) -> &str;

    fn merge(&self, successful: &[&ExecutionResult]) -> Response;
}

/// Highest confidence wins; ties go to the earliest result.
#[derive(Debug, Default, Clone, Copy)]
pub struct BestOf;

impl MergePolicy for BestOf {
    fn name(&self) -> &str {
        "best_of"
    }

    fn merge(&self, successful: &[&ExecutionResult]) -> Response {
        let Some((&first, rest)) = successful.split_first() else {
            return Response::error(NO_CAPABILITY);
        };

        let mut best = first;
        for &result in rest {
            if result.confidence > best.confidence {
                best = result;
            }
        }

        Response::success(best.content.clone())
            .with_metadata("selected", json!(best.capability_id))
    }
}

/// Every successful result, highest confidence first, tagged with its source.
#[derive(Debug, Default, Clone, Copy)]
pub struct Concatenate;

impl MergePolicy for Concatenate {
    fn name(&self) -> &str {
        "concatenate"
    }

    fn merge(&self, successful: &[&ExecutionResult]) -> Response {
        let mut ordered = successful.to_vec();
        ordered.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let content = ordered
            .iter()
            .map(|r| format!("[{}] {}", r.capability_id, r.content_text()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources: Vec<&str> = ordered.iter().map(|r| r.capability_id.as_str()).collect();

        Response::success(Value::String(content)).with_metadata("sources", json!(sources))
    }
}

/// Reduces a result set to one response through a [`MergePolicy`].
#[derive(Clone)]
pub struct ResponseAggregator {
    policy: Arc<dyn MergePolicy>,
}

impl Default for ResponseAggregator {
    fn default() -> Self {
        Self::new(Arc::new(BestOf))
    }
}

impl std::fmt::Debug for ResponseAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseAggregator")
            .field("policy", &self.policy.name())
            .finish()
    }
}

impl ResponseAggregator {
    pub fn new(policy: Arc<dyn MergePolicy>) -> Self {
        Self { policy }
    }

    pub fn from_strategy(strategy: MergeStrategy) -> Self {
        match strategy {
            MergeStrategy::BestOf => Self::new(Arc::new(BestOf)),
            MergeStrategy::Concatenate => Self::new(Arc::new(Concatenate)),
        }
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn aggregate(&self, results: &[ExecutionResult]) -> Response {
        if results.is_empty() {
            return Response::error(NO_CAPABILITY);
        }

        let successful: Vec<&ExecutionResult> = results.iter().filter(|r| r.is_success()).collect();
        if successful.is_empty() {
            let reasons = results
                .iter()
                .map(|r| {
                    format!(
                        "{}: {}",
                        r.capability_id,
                        r.error.as_deref().unwrap_or("unknown error")
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Response::error(reasons);
        }

        self.policy
            .merge(&successful)
            .with_metadata("merge_strategy", json!(self.policy.name()))
    }
}
