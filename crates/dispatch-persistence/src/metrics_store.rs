//! Append-only storage for finalized request metrics.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dispatch_models::RequestMetricsRecord;
use tracing::{debug, warn};

use crate::atomic::{atomic_write_json, ensure_dir, read_json, read_json_optional};
use crate::error::{PersistenceError, Result};

/// Storage collaborator for finalized metrics records.
///
/// Records are written once, keyed by request ID, and are readable by ID or
/// by the time range their request started in.
pub trait MetricsStore: Send + Sync {
    /// Persist a finalized record. Fails with `AlreadyExists` on a second
    /// write for the same request ID.
    fn append(&self, record: &RequestMetricsRecord) -> Result<()>;

    /// Load a record by request ID.
    fn load(&self, request_id: &str) -> Result<Option<RequestMetricsRecord>>;

    /// List records whose request started within `[start, end]`, oldest first.
    fn list_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RequestMetricsRecord>>;
}

fn ensure_finalized(record: &RequestMetricsRecord) -> Result<()> {
    if record.is_finalized() {
        Ok(())
    } else {
        Err(PersistenceError::NotFinalized(record.request_id.clone()))
    }
}

/// Stores each record as its own JSON file:
/// ```text
/// base_path/
/// └── requests/
///     ├── 0b6c…e1.json
///     └── 9f20…4a.json
/// ```
pub struct FileMetricsStore {
    base_path: PathBuf,
}

impl FileMetricsStore {
    /// Create a store rooted at `base_path`, creating the directory layout.
    ///
    /// An error here means metrics storage is unreachable.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            base_path: base_path.into(),
        };
        ensure_dir(&store.requests_dir())?;
        Ok(store)
    }

    fn requests_dir(&self) -> PathBuf {
        self.base_path.join("requests")
    }

    fn record_path(&self, request_id: &str) -> PathBuf {
        self.requests_dir()
            .join(format!("{}.json", file_stem(request_id)))
    }
}

/// Filename stem for a request ID.
///
/// IDs are caller-controllable, so anything outside `[A-Za-z0-9-]` is
/// written as `_xx` per byte. `_` itself is escaped, which keeps the
/// mapping one-to-one.
fn file_stem(request_id: &str) -> String {
    let mut stem = String::with_capacity(request_id.len());
    for byte in request_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{:02x}", byte));
        }
    }
    stem
}

impl MetricsStore for FileMetricsStore {
    fn append(&self, record: &RequestMetricsRecord) -> Result<()> {
        ensure_finalized(record)?;
        let path = self.record_path(&record.request_id);

        atomic_write_json(&path, record, false).map_err(|e| match e {
            PersistenceError::AlreadyExists { .. } => PersistenceError::AlreadyExists {
                kind: "request".to_string(),
                id: record.request_id.clone(),
            },
            other => other,
        })?;

        debug!(request_id = %record.request_id, path = %path.display(), "persisted metrics record");
        Ok(())
    }

    fn load(&self, request_id: &str) -> Result<Option<RequestMetricsRecord>> {
        let path = self.record_path(request_id);
        let record: Option<RequestMetricsRecord> = read_json_optional(&path)?;
        match record {
            Some(record) if record.request_id != request_id => {
                warn!(
                    request_id = %request_id,
                    stored = %record.request_id,
                    path = %path.display(),
                    "metrics file belongs to another request"
                );
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn list_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RequestMetricsRecord>> {
        let dir = self.requests_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|source| PersistenceError::ReadError {
            path: dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| PersistenceError::ReadError {
                path: dir.clone(),
                source,
            })?;

            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match read_json::<RequestMetricsRecord>(&path) {
                    Ok(record) if record.started_within(start, end) => records.push(record),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "skipping unreadable metrics record"
                        );
                    }
                }
            }
        }

        records.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(records)
    }
}

/// Process-local store, used when persistence to disk is not wanted.
#[derive(Default)]
pub struct MemoryMetricsStore {
    records: RwLock<HashMap<String, RequestMetricsRecord>>,
}

impl MemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricsStore for MemoryMetricsStore {
    fn append(&self, record: &RequestMetricsRecord) -> Result<()> {
        ensure_finalized(record)?;
        let mut records = self
            .records
            .write()
            .map_err(|e| PersistenceError::LockPoisoned(e.to_string()))?;

        if records.contains_key(&record.request_id) {
            return Err(PersistenceError::AlreadyExists {
                kind: "request".to_string(),
                id: record.request_id.clone(),
            });
        }
        records.insert(record.request_id.clone(), record.clone());
        Ok(())
    }

    fn load(&self, request_id: &str) -> Result<Option<RequestMetricsRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| PersistenceError::LockPoisoned(e.to_string()))?;
        Ok(records.get(request_id).cloned())
    }

    fn list_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RequestMetricsRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| PersistenceError::LockPoisoned(e.to_string()))?;

        let mut matching: Vec<_> = records
            .values()
            .filter(|r| r.started_within(start, end))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(matching)
    }
}
