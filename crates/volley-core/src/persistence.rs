//! Durable snapshot of the schedule plus dispatch history.
//!
//! The file is a single JSON document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "schedule": { "<completion secs>": [ActionRequest, ...] },
//!   "requests": { "<id>": ActionRequest },
//!   "last_update": "<rfc3339>",
//!   "total": <request count>,
//!   "history": [DispatchReport, ...]
//! }
//! ```
//!
//! `requests` duplicates `schedule` as a flat index for external tooling that
//! only needs existence checks. Loading rebuilds the store from `schedule`.

use crate::error::{Result, VolleyError};
use crate::io::atomic_write;
use crate::paths;
use crate::report::DispatchReport;
use crate::schedule::ScheduleStore;
use crate::types::ActionRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Oldest reports are dropped beyond this many.
pub const HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub schedule: BTreeMap<String, Vec<ActionRequest>>,
    #[serde(default)]
    pub requests: BTreeMap<String, ActionRequest>,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub history: Vec<DispatchReport>,
}

fn default_version() -> u32 {
    1
}

impl Snapshot {
    fn capture(store: &ScheduleStore, history: Vec<DispatchReport>) -> Self {
        let mut schedule = BTreeMap::new();
        let mut requests = BTreeMap::new();
        for (completion, batch) in store.batches() {
            schedule.insert(completion.to_string(), batch.to_vec());
            for req in batch {
                requests.insert(req.id.clone(), req.clone());
            }
        }
        Self {
            version: 1,
            total: requests.len(),
            schedule,
            requests,
            last_update: Utc::now(),
            history,
        }
    }

    fn restore(&self) -> ScheduleStore {
        let mut store = ScheduleStore::new();
        for (key, batch) in &self.schedule {
            let Ok(completion) = key.parse::<i64>() else {
                tracing::warn!(key = %key, "ignoring snapshot batch with non-numeric key");
                continue;
            };
            for req in batch {
                store.insert(completion, req.clone());
            }
        }
        store
    }
}

pub struct SchedulePersistence {
    path: PathBuf,
}

impl SchedulePersistence {
    /// Snapshot at `<root>/.volley/cache/schedule.json`.
    pub fn new(root: &Path) -> Self {
        Self::at(paths::snapshot_path(root))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot; `None` if it was never written.
    pub fn read(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Rebuild the store from disk. A missing snapshot is an empty store.
    pub fn load(&self) -> Result<ScheduleStore> {
        Ok(self
            .read()?
            .map(|s| s.restore())
            .unwrap_or_default())
    }

    pub fn history(&self) -> Result<Vec<DispatchReport>> {
        Ok(self.read()?.map(|s| s.history).unwrap_or_default())
    }

    /// Write `store`, keeping whatever history is already on disk.
    pub fn save(&self, store: &ScheduleStore) -> Result<()> {
        let history = self.history().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "unreadable snapshot history, starting fresh");
            Vec::new()
        });
        self.write(&Snapshot::capture(store, history))
    }

    /// Write `store` and append `report` to the history.
    pub fn record(&self, store: &ScheduleStore, report: &DispatchReport) -> Result<()> {
        let mut history = self.history().unwrap_or_default();
        history.push(report.clone());
        if history.len() > HISTORY_LIMIT {
            let excess = history.len() - HISTORY_LIMIT;
            history.drain(..excess);
        }
        self.write(&Snapshot::capture(store, history))
    }

    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let data = serde_json::to_string_pretty(snapshot)?;
        atomic_write(&self.path, data.as_bytes())
            .map_err(|e| VolleyError::Persistence(format!("{}: {e}", self.path.display())))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
