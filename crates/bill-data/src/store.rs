//! Bill persistence with live, filtered snapshots.
//!
//! Every successful create or delete publishes the full filtered record list
//! to each open subscription through a [`tokio::sync::watch`] channel, so a
//! subscriber always sees the latest state without tracking deltas.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use bill_core::error::{BillError, Result};
use bill_core::models::{is_composite_id, BillRecord, NewBillRecord};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

/// File name of the JSON record store inside the data directory.
pub const STORE_FILE_NAME: &str = "bills.json";

// ── RecordFilter ──────────────────────────────────────────────────────────────

/// Which records a subscription or snapshot sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    /// Records created by one user.
    OwnedBy(String),
    /// Every record (administrative view).
    All,
}

impl RecordFilter {
    /// `All` for administrators, otherwise the user's own records.
    pub fn for_user(user_id: &str, admin: bool) -> Self {
        if admin {
            RecordFilter::All
        } else {
            RecordFilter::OwnedBy(user_id.to_string())
        }
    }

    pub fn matches(&self, record: &BillRecord) -> bool {
        match self {
            RecordFilter::OwnedBy(author) => record.author_id == *author,
            RecordFilter::All => true,
        }
    }

    fn apply(&self, records: &[BillRecord]) -> Vec<BillRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

// ── BillStore ─────────────────────────────────────────────────────────────────

/// A document store for bills.
pub trait BillStore: Send + Sync {
    /// Open a live view; the receiver holds the current filtered list and is
    /// updated after every create or delete.
    fn subscribe(&self, filter: RecordFilter) -> watch::Receiver<Vec<BillRecord>>;

    /// Persist a new bill, assigning its id and timestamp. Returns the id.
    fn create(&self, new: NewBillRecord) -> Result<String>;

    /// Remove a bill by id. Merged-row ids are rejected.
    fn delete(&self, id: &str) -> Result<()>;

    /// The current filtered list.
    fn snapshot(&self, filter: &RecordFilter) -> Result<Vec<BillRecord>>;
}

// ── Shared state ──────────────────────────────────────────────────────────────

/// Record list plus the open subscriptions.
#[derive(Default)]
struct StoreState {
    records: Vec<BillRecord>,
    subscribers: Vec<(RecordFilter, watch::Sender<Vec<BillRecord>>)>,
}

impl StoreState {
    fn subscribe(&mut self, filter: RecordFilter) -> watch::Receiver<Vec<BillRecord>> {
        let (tx, rx) = watch::channel(filter.apply(&self.records));
        self.subscribers.push((filter, tx));
        rx
    }

    /// Push the current list to every live subscriber and drop closed ones.
    fn publish(&mut self) {
        self.subscribers.retain(|(_, tx)| !tx.is_closed());
        for (filter, tx) in &self.subscribers {
            tx.send_replace(filter.apply(&self.records));
        }
        debug!(
            subscribers = self.subscribers.len(),
            records = self.records.len(),
            "published record snapshot"
        );
    }

    /// Build the list after removing `id`, or fail if it cannot be removed.
    fn without(&self, id: &str) -> Result<Vec<BillRecord>> {
        if is_composite_id(id) {
            return Err(BillError::CompositeRecord(id.to_string()));
        }
        if !self.records.iter().any(|r| r.id == id) {
            return Err(BillError::RecordNotFound(id.to_string()));
        }
        Ok(self
            .records
            .iter()
            .filter(|r| r.id != id)
            .cloned()
            .collect())
    }
}

fn new_record(new: NewBillRecord) -> BillRecord {
    let id = uuid::Uuid::new_v4().to_string();
    BillRecord::from_new(id, Utc::now(), new)
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// Non-persistent store used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-loaded with `records`.
    pub fn with_records(records: Vec<BillRecord>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                records,
                subscribers: Vec::new(),
            }),
        }
    }
}

impl BillStore for MemoryStore {
    fn subscribe(&self, filter: RecordFilter) -> watch::Receiver<Vec<BillRecord>> {
        lock(&self.state).subscribe(filter)
    }

    fn create(&self, new: NewBillRecord) -> Result<String> {
        let record = new_record(new);
        let id = record.id.clone();
        let mut state = lock(&self.state);
        state.records.push(record);
        state.publish();
        Ok(id)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.records = state.without(id)?;
        state.publish();
        Ok(())
    }

    fn snapshot(&self, filter: &RecordFilter) -> Result<Vec<BillRecord>> {
        Ok(filter.apply(&lock(&self.state).records))
    }
}

// ── JsonFileStore ─────────────────────────────────────────────────────────────

/// Store backed by a single JSON array file, rewritten atomically on change.
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonFileStore {
    /// Open (or start) the store in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(STORE_FILE_NAME);
        let records = Self::load(&path)?;
        info!(path = %path.display(), count = records.len(), "opened bill store");
        Ok(Self {
            path,
            state: Mutex::new(StoreState {
                records,
                subscribers: Vec::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the store file and publish when it changed on disk.
    ///
    /// Returns `true` when subscribers were notified.
    pub fn reload(&self) -> Result<bool> {
        let records = Self::load(&self.path)?;
        let mut state = lock(&self.state);
        if state.records == records {
            return Ok(false);
        }
        debug!(count = records.len(), "bill store changed on disk");
        state.records = records;
        state.publish();
        Ok(true)
    }

    fn load(path: &Path) -> Result<Vec<BillRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path).map_err(|e| BillError::file(path, e))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Write `records` to a temp file then rename it over the store file.
    fn persist(&self, records: &[BillRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BillError::file(parent, e))?;
        }
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| BillError::file(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| BillError::file(&self.path, e))?;
        Ok(())
    }
}

impl BillStore for JsonFileStore {
    fn subscribe(&self, filter: RecordFilter) -> watch::Receiver<Vec<BillRecord>> {
        lock(&self.state).subscribe(filter)
    }

    fn create(&self, new: NewBillRecord) -> Result<String> {
        let record = new_record(new);
        let id = record.id.clone();

        let mut state = lock(&self.state);
        let mut records = state.records.clone();
        records.push(record);
        self.persist(&records)?;
        state.records = records;
        state.publish();

        info!(id = %id, "bill created");
        Ok(id)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let records = state.without(id)?;
        self.persist(&records)?;
        state.records = records;
        state.publish();

        info!(id = %id, "bill deleted");
        Ok(())
    }

    fn snapshot(&self, filter: &RecordFilter) -> Result<Vec<BillRecord>> {
        Ok(filter.apply(&lock(&self.state).records))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
