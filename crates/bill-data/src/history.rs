//! Append-only log of create and delete operations (`history.jsonl`).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use bill_core::error::{BillError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// File name of the history log inside the data directory.
pub const HISTORY_FILE_NAME: &str = "history.jsonl";

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryAction {
    #[serde(rename = "登録")]
    Create,
    #[serde(rename = "削除")]
    Delete,
}

impl HistoryAction {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryAction::Create => "登録",
            HistoryAction::Delete => "削除",
        }
    }
}

/// One line of the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: HistoryAction,
    pub details: String,
    pub recorder_name: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        action: HistoryAction,
        details: impl Into<String>,
        recorder_name: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            action,
            details: details.into(),
            recorder_name: recorder_name.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
        }
    }
}

// ── HistoryLog ────────────────────────────────────────────────────────────────

/// JSON-lines history file.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(HISTORY_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry.
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BillError::file(parent, e))?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BillError::file(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| BillError::file(&self.path, e))
    }

    /// Append an entry; failures are logged and otherwise ignored.
    pub fn record(&self, entry: HistoryEntry) {
        if let Err(e) = self.append(&entry) {
            warn!(error = %e, action = entry.action.label(), "failed to write history entry");
        }
    }

    /// The newest `limit` entries, oldest first. Unreadable lines are skipped.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| BillError::file(&self.path, e))?;

        let mut entries = Vec::new();
        for (line_number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(line = line_number + 1, error = %e, "skipping malformed history line")
                }
            }
        }

        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
