//! Message-passing metrics recorder.
//!
//! One task owns every open record. Callers hold a cheap [`MetricsHandle`]
//! and send events to it; tracking never blocks and never fails the
//! caller. Events for one request are applied in the order they were sent.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dispatch_models::{Metadata, ModelUsageEntry, RequestMetricsRecord, UsageEntry};
use dispatch_persistence::{MetricsStore, PersistenceError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Number of finalized request IDs remembered for duplicate detection.
const CLOSED_MEMORY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UsageKind {
    Agent,
    Tool,
}

enum Event {
    Start(Box<RequestMetricsRecord>),
    Usage {
        request_id: String,
        kind: UsageKind,
        entry: UsageEntry,
    },
    Model {
        request_id: String,
        entry: ModelUsageEntry,
    },
    End {
        request_id: String,
        success: bool,
        error: Option<String>,
    },
    Flush(oneshot::Sender<()>),
    Snapshot {
        request_id: String,
        reply: oneshot::Sender<Option<RequestMetricsRecord>>,
    },
}

/// Entry point for starting the recorder task.
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Spawn the recorder on the current Tokio runtime.
    pub fn spawn(store: Arc<dyn MetricsStore>) -> MetricsHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = RecorderState::new(store);
        tokio::spawn(state.run(rx));
        MetricsHandle { tx }
    }
}

/// Cloneable sender side of the recorder.
#[derive(Clone)]
pub struct MetricsHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl std::fmt::Debug for MetricsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl MetricsHandle {
    fn send(&self, event: Event) {
        if self.tx.send(event).is_err() {
            warn!("metrics recorder is not running, event dropped");
        }
    }

    /// Open a record under a fresh request ID and return it.
    pub fn start_request(&self, prompt: &str, metadata: Metadata) -> String {
        let request_id = Uuid::new_v4().to_string();
        self.start_request_with_id(&request_id, prompt, metadata);
        request_id
    }

    /// Open a record under a caller-chosen request ID.
    pub fn start_request_with_id(&self, request_id: &str, prompt: &str, metadata: Metadata) {
        let record = RequestMetricsRecord::open(request_id, prompt, metadata);
        self.send(Event::Start(Box::new(record)));
    }

    /// Append an agent invocation to an open record.
    pub fn track_agent_usage(
        &self,
        request_id: &str,
        agent_id: &str,
        confidence: Option<f64>,
        duration: Duration,
        success: bool,
        metadata: Option<serde_json::Value>,
    ) {
        self.track_usage(
            UsageKind::Agent,
            request_id,
            agent_id,
            confidence,
            duration,
            success,
            metadata,
        );
    }

    /// Append a tool invocation to an open record.
    pub fn track_tool_usage(
        &self,
        request_id: &str,
        tool_id: &str,
        confidence: Option<f64>,
        duration: Duration,
        success: bool,
        metadata: Option<serde_json::Value>,
    ) {
        self.track_usage(
            UsageKind::Tool,
            request_id,
            tool_id,
            confidence,
            duration,
            success,
            metadata,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn track_usage(
        &self,
        kind: UsageKind,
        request_id: &str,
        capability_id: &str,
        confidence: Option<f64>,
        duration: Duration,
        success: bool,
        metadata: Option<serde_json::Value>,
    ) {
        let entry = UsageEntry {
            capability_id: capability_id.to_string(),
            confidence,
            duration_ms: duration.as_millis() as u64,
            success,
            metadata,
            recorded_at: Utc::now(),
        };
        self.send(Event::Usage {
            request_id: request_id.to_string(),
            kind,
            entry,
        });
    }

    /// Append a generation-model call to an open record.
    #[allow(clippy::too_many_arguments)]
    pub fn track_model_usage(
        &self,
        request_id: &str,
        model_id: &str,
        tokens_in: u64,
        tokens_out: u64,
        duration: Duration,
        success: bool,
        metadata: Option<serde_json::Value>,
    ) {
        let entry = ModelUsageEntry {
            model_id: model_id.to_string(),
            tokens_in,
            tokens_out,
            duration_ms: duration.as_millis() as u64,
            success,
            metadata,
            recorded_at: Utc::now(),
        };
        self.send(Event::Model {
            request_id: request_id.to_string(),
            entry,
        });
    }

    /// Finalize and persist a record. Later calls for the same ID are no-ops.
    pub fn end_request(&self, request_id: &str, success: bool) {
        self.send(Event::End {
            request_id: request_id.to_string(),
            success,
            error: None,
        });
    }

    /// Finalize a record as failed with a reason.
    pub fn end_request_with_error(&self, request_id: &str, error: impl Into<String>) {
        self.send(Event::End {
            request_id: request_id.to_string(),
            success: false,
            error: Some(error.into()),
        });
    }

    /// Wait until every event sent before this call has been applied.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        self.send(Event::Flush(ack));
        let _ = done.await;
    }

    /// Current state of a record: open in memory, or persisted.
    pub async fn snapshot(&self, request_id: &str) -> Option<RequestMetricsRecord> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::Snapshot {
            request_id: request_id.to_string(),
            reply,
        });
        rx.await.ok().flatten()
    }
}

struct RecorderState {
    store: Arc<dyn MetricsStore>,
    open: HashMap<String, RequestMetricsRecord>,
    closed: HashSet<String>,
    closed_order: VecDeque<String>,
}

impl RecorderState {
    fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self {
            store,
            open: HashMap::new(),
            closed: HashSet::new(),
            closed_order: VecDeque::new(),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = rx.recv().await {
            self.apply(event).await;
        }

        if !self.open.is_empty() {
            warn!(open = self.open.len(), "metrics recorder stopped with open records");
        }
    }

    async fn apply(&mut self, event: Event) {
        match event {
            Event::Start(record) => self.start(*record),
            Event::Usage {
                request_id,
                kind,
                entry,
            } => match self.open.get_mut(&request_id) {
                Some(record) => match kind {
                    UsageKind::Agent => record.agent_usages.push(entry),
                    UsageKind::Tool => record.tool_usages.push(entry),
                },
                None => self.ignore(&request_id, "usage"),
            },
            Event::Model { request_id, entry } => match self.open.get_mut(&request_id) {
                Some(record) => record.model_usages.push(entry),
                None => self.ignore(&request_id, "model usage"),
            },
            Event::End {
                request_id,
                success,
                error,
            } => self.end(&request_id, success, error).await,
            Event::Flush(ack) => {
                let _ = ack.send(());
            }
            Event::Snapshot { request_id, reply } => {
                let record = match self.open.get(&request_id) {
                    Some(record) => Some(record.clone()),
                    None => self.load(&request_id).await,
                };
                let _ = reply.send(record);
            }
        }
    }

    fn start(&mut self, record: RequestMetricsRecord) {
        let request_id = record.request_id.clone();
        if self.open.contains_key(&request_id) || self.closed.contains(&request_id) {
            warn!(request_id = %request_id, "request already tracked, start ignored");
            return;
        }
        debug!(request_id = %request_id, "metrics record opened");
        self.open.insert(request_id, record);
    }

    fn ignore(&self, request_id: &str, what: &str) {
        if self.closed.contains(request_id) {
            debug!(request_id = %request_id, "{} after finalization ignored", what);
        } else {
            warn!(request_id = %request_id, "{} for unknown request ignored", what);
        }
    }

    async fn end(&mut self, request_id: &str, success: bool, error: Option<String>) {
        let Some(mut record) = self.open.remove(request_id) else {
            debug!(request_id = %request_id, "end for closed or unknown request ignored");
            return;
        };

        record.finalize(Utc::now(), success, error);
        self.remember_closed(request_id);

        let store = Arc::clone(&self.store);
        let outcome = tokio::task::spawn_blocking(move || store.append(&record)).await;
        match outcome {
            Ok(Ok(())) => debug!(request_id = %request_id, success, "metrics record finalized"),
            Ok(Err(PersistenceError::AlreadyExists { .. })) => {
                debug!(request_id = %request_id, "metrics record already persisted");
            }
            Ok(Err(e)) => {
                error!(request_id = %request_id, error = %e, "failed to persist metrics record");
            }
            Err(e) => {
                error!(request_id = %request_id, error = %e, "metrics persistence task failed");
            }
        }
    }

    fn remember_closed(&mut self, request_id: &str) {
        if self.closed.insert(request_id.to_string()) {
            self.closed_order.push_back(request_id.to_string());
        }
        while self.closed_order.len() > CLOSED_MEMORY {
            if let Some(oldest) = self.closed_order.pop_front() {
                self.closed.remove(&oldest);
            }
        }
    }

    async fn load(&self, request_id: &str) -> Option<RequestMetricsRecord> {
        let store = Arc::clone(&self.store);
        let id = request_id.to_string();
        match tokio::task::spawn_blocking(move || store.load(&id)).await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                warn!(request_id = %request_id, error = %e, "failed to load metrics record");
                None
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "metrics load task failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_persistence::{FileMetricsStore, MemoryMetricsStore};
    use serde_json::json;

    fn recorder() -> (Arc<MemoryMetricsStore>, MetricsHandle) {
        let store = Arc::new(MemoryMetricsStore::new());
        let handle = MetricsRecorder::spawn(store.clone());
        (store, handle)
    }

    #[tokio::test]
    async fn test_full_lifecycle_persists_record() {
        let (store, metrics) = recorder();

        let id = metrics.start_request("translate hello", Metadata::new());
        metrics.track_agent_usage(
            &id,
            "translator",
            Some(0.9),
            Duration::from_millis(12),
            true,
            None,
        );
        metrics.track_tool_usage(&id, "word_count", None, Duration::from_millis(1), true, None);
        metrics.track_model_usage(&id, "test-model", 10, 4, Duration::from_millis(3), true, None);
        metrics.end_request(&id, true);
        metrics.flush().await;

        let record = store.load(&id).unwrap().unwrap();
        assert!(record.success);
        assert!(record.is_finalized());
        assert_eq!(record.prompt_tokens, 2);
        assert_eq!(record.agent_usages.len(), 1);
        assert_eq!(record.agent_usages[0].confidence, Some(0.9));
        assert_eq!(record.tool_usages.len(), 1);
        assert_eq!(record.model_usages[0].tokens_out, 4);
    }

    #[tokio::test]
    async fn test_end_request_is_idempotent() {
        let (store, metrics) = recorder();

        let id = metrics.start_request("p", Metadata::new());
        metrics.end_request(&id, true);
        metrics.end_request(&id, false);
        metrics.track_agent_usage(&id, "late", None, Duration::ZERO, true, None);
        metrics.flush().await;

        let record = store.load(&id).unwrap().unwrap();
        assert!(record.success);
        assert!(record.agent_usages.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_restart_after_end_is_ignored() {
        let (store, metrics) = recorder();

        metrics.start_request_with_id("req-1", "first", Metadata::new());
        metrics.end_request("req-1", true);
        metrics.start_request_with_id("req-1", "second", Metadata::new());
        metrics.end_request("req-1", false);
        metrics.flush().await;

        let record = store.load("req-1").unwrap().unwrap();
        assert_eq!(record.prompt, "first");
        assert!(record.success);
    }

    #[tokio::test]
    async fn test_end_with_error() {
        let (store, metrics) = recorder();

        let id = metrics.start_request("p", Metadata::new());
        metrics.end_request_with_error(&id, "no capability available");
        metrics.flush().await;

        let record = store.load(&id).unwrap().unwrap();
        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("no capability available"));
    }

    #[tokio::test]
    async fn test_unknown_request_is_noop() {
        let (store, metrics) = recorder();

        metrics.track_agent_usage("ghost", "a", None, Duration::ZERO, true, None);
        metrics.end_request("ghost", true);
        metrics.flush().await;

        assert!(store.is_empty());
        assert!(metrics.snapshot("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_open_and_persisted() {
        let (_store, metrics) = recorder();

        let id = metrics.start_request("p", [("source".to_string(), json!("cli"))].into());
        metrics.track_agent_usage(&id, "general", Some(1.0), Duration::from_millis(2), true, None);

        let open = metrics.snapshot(&id).await.unwrap();
        assert!(!open.is_finalized());
        assert_eq!(open.metadata.get("source"), Some(&json!("cli")));

        metrics.end_request(&id, true);
        let closed = metrics.snapshot(&id).await.unwrap();
        assert!(closed.is_finalized());
        assert_eq!(closed.agent_usages.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileMetricsStore::new(dir.path()).unwrap());
        let metrics = MetricsRecorder::spawn(store.clone());

        let id = metrics.start_request("hello", Metadata::new());
        metrics.end_request(&id, true);
        metrics.flush().await;

        assert!(store.load(&id).unwrap().is_some());
    }
}
