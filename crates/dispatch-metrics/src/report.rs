//! Aggregate statistics over persisted metrics records.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use dispatch_models::{CapabilityKind, RequestMetricsRecord, UsageEntry};
use serde::Serialize;

/// Default reporting window in days.
pub const DEFAULT_REPORT_DAYS: u32 = 30;

/// `[now - days, now]`.
pub fn last_days(days: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = Utc::now();
    (end - Duration::days(i64::from(days)), end)
}

/// Usage statistics for one agent or tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityStats {
    pub capability_id: String,
    pub total_uses: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
    /// Mean over the entries that carried a confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Accumulator {
    total: u64,
    successes: u64,
    duration_ms: u64,
    confidence_sum: f64,
    confidence_count: u64,
    last_used: Option<DateTime<Utc>>,
}

impl Accumulator {
    fn add(&mut self, entry: &UsageEntry) {
        self.total += 1;
        if entry.success {
            self.successes += 1;
        }
        self.duration_ms += entry.duration_ms;
        if let Some(confidence) = entry.confidence {
            self.confidence_sum += confidence;
            self.confidence_count += 1;
        }
        self.last_used = self.last_used.max(Some(entry.recorded_at));
    }

    fn finish(self, capability_id: String) -> CapabilityStats {
        let total = self.total.max(1) as f64;
        CapabilityStats {
            capability_id,
            total_uses: self.total,
            successes: self.successes,
            success_rate: self.successes as f64 / total,
            total_duration_ms: self.duration_ms,
            avg_duration_ms: self.duration_ms as f64 / total,
            avg_confidence: (self.confidence_count > 0)
                .then(|| self.confidence_sum / self.confidence_count as f64),
            last_used: self.last_used,
        }
    }
}

/// Per-capability usage for either agents or tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub kind: CapabilityKind,
    /// Most used first.
    pub capabilities: Vec<CapabilityStats>,
}

impl MetricsReport {
    /// Build stats for `kind`, optionally restricted to one capability ID.
    pub fn build(
        records: &[RequestMetricsRecord],
        kind: CapabilityKind,
        filter: Option<&str>,
    ) -> Self {
        let mut by_id: HashMap<&str, Accumulator> = HashMap::new();

        for record in records {
            let entries = match kind {
                CapabilityKind::Agent => &record.agent_usages,
                CapabilityKind::Tool => &record.tool_usages,
            };
            for entry in entries {
                if filter.is_some_and(|id| id != entry.capability_id) {
                    continue;
                }
                by_id.entry(entry.capability_id.as_str()).or_default().add(entry);
            }
        }

        let mut capabilities: Vec<_> = by_id
            .into_iter()
            .map(|(id, acc)| acc.finish(id.to_string()))
            .collect();
        capabilities.sort_by(|a, b| {
            b.total_uses
                .cmp(&a.total_uses)
                .then_with(|| a.capability_id.cmp(&b.capability_id))
        });

        Self { kind, capabilities }
    }

    pub fn get(&self, capability_id: &str) -> Option<&CapabilityStats> {
        self.capabilities.iter().find(|s| s.capability_id == capability_id)
    }
}

/// Totals across requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub agent_calls: u64,
    pub tool_calls: u64,
    pub model_calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

impl RequestSummary {
    pub fn build(records: &[RequestMetricsRecord]) -> Self {
        let total = records.len() as u64;
        let successful = records.iter().filter(|r| r.success).count() as u64;
        let durations: Vec<u64> = records.iter().filter_map(|r| r.duration_ms).collect();
        let avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };

        let model_usages = records.iter().flat_map(|r| r.model_usages.iter());

        Self {
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            success_rate: if total == 0 { 0.0 } else { successful as f64 / total as f64 },
            avg_duration_ms,
            agent_calls: records.iter().map(|r| r.agent_usages.len() as u64).sum(),
            tool_calls: records.iter().map(|r| r.tool_usages.len() as u64).sum(),
            model_calls: model_usages.clone().count() as u64,
            tokens_in: model_usages.clone().map(|m| m.tokens_in).sum(),
            tokens_out: model_usages.map(|m| m.tokens_out).sum(),
        }
    }
}
