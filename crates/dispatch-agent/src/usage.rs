//! Feed execution outcomes into metrics and capability counters.

use dispatch_metrics::MetricsHandle;
use dispatch_models::{CapabilityKind, ExecutionResult};
use serde_json::json;
use tracing::warn;

use crate::registry::CapabilityRegistry;

/// Record every result as one usage entry and one counter update.
pub fn record_results(
    metrics: Option<&MetricsHandle>,
    registry: &CapabilityRegistry,
    request_id: &str,
    kind: CapabilityKind,
    results: &[ExecutionResult],
) {
    for result in results {
        let success = result.is_success();

        if let Err(e) = registry.record_outcome(&result.capability_id, success) {
            warn!(capability_id = %result.capability_id, error = %e, "failed to record outcome");
        }

        let Some(metrics) = metrics else {
            continue;
        };
        let detail = (!success).then(|| {
            json!({
                "status": result.status.to_string(),
                "error": result.error,
            })
        });
        match kind {
            CapabilityKind::Agent => metrics.track_agent_usage(
                request_id,
                &result.capability_id,
                Some(result.confidence),
                result.duration,
                success,
                detail,
            ),
            CapabilityKind::Tool => metrics.track_tool_usage(
                request_id,
                &result.capability_id,
                Some(result.confidence),
                result.duration,
                success,
                detail,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_metrics::MetricsRecorder;
    use dispatch_models::CapabilityDescriptor;
    use dispatch_persistence::MemoryMetricsStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_record_results_updates_both() {
        let registry = CapabilityRegistry::from_descriptors(vec![
            CapabilityDescriptor::tool("current_time", "time"),
            CapabilityDescriptor::tool("word_count", "words"),
        ])
        .unwrap();
        let metrics = MetricsRecorder::spawn(Arc::new(MemoryMetricsStore::new()));
        metrics.start_request_with_id("req", "p", Default::default());

        let results = vec![
            ExecutionResult::success("current_time", 0.9, json!("now"), Duration::from_millis(1)),
            ExecutionResult::timeout("word_count", 0.7, "timed out", Duration::from_millis(50)),
        ];
        record_results(Some(&metrics), &registry, "req", CapabilityKind::Tool, &results);

        let record = metrics.snapshot("req").await.unwrap();
        assert_eq!(record.tool_usages.len(), 2);
        assert!(record.agent_usages.is_empty());
        assert_eq!(record.tool_usages[1].metadata.as_ref().unwrap()["status"], "timeout");

        let word_count = registry.get("word_count").unwrap();
        assert_eq!((word_count.usage_count, word_count.success_count), (1, 0));
        assert_eq!(registry.get("current_time").unwrap().success_count, 1);
    }
}
