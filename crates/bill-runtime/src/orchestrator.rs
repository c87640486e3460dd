//! Async projection orchestrator.
//!
//! Watches the store subscription and the selected view mode in a tokio task
//! and sends a freshly projected [`ProjectionSnapshot`] through an `mpsc`
//! channel whenever either changes, so the TUI event loop never shares the
//! record list.

use bill_core::calculations::{ComparisonResult, CostComparator};
use bill_core::contracts::ViewMode;
use bill_core::models::{BillRecord, DerivedBillRecord};
use bill_data::aggregator::BillAggregator;
use tokio::sync::{mpsc, watch};

// ── Public types ──────────────────────────────────────────────────────────────

/// One projected view, ready for display or export.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSnapshot {
    /// The mode the records were projected for.
    pub mode: ViewMode,
    /// Projected rows, newest first.
    pub records: Vec<DerivedBillRecord>,
    /// Latest bill against the older ones, when there are at least two.
    pub comparison: Option<ComparisonResult>,
    /// Number of stored records visible before projection.
    pub source_count: usize,
}

impl ProjectionSnapshot {
    /// Project `records` for `mode`, optionally restricted to one recorder.
    pub fn build(records: &[BillRecord], mode: &ViewMode, recorder: Option<&str>) -> Self {
        let visible = BillAggregator::filter_by_recorder(records, recorder);
        let projected = BillAggregator::project(&visible, mode);
        let comparison = CostComparator::compare(&projected);
        Self {
            mode: mode.clone(),
            records: projected,
            comparison,
            source_count: visible.len(),
        }
    }
}

// ── ProjectionOrchestrator ────────────────────────────────────────────────────

/// Background re-projection coordinator.
pub struct ProjectionOrchestrator {
    records: watch::Receiver<Vec<BillRecord>>,
    mode: watch::Receiver<ViewMode>,
    recorder: Option<String>,
}

impl ProjectionOrchestrator {
    /// Create an orchestrator over a store subscription and a mode channel.
    pub fn new(records: watch::Receiver<Vec<BillRecord>>, mode: watch::Receiver<ViewMode>) -> Self {
        Self {
            records,
            mode,
            recorder: None,
        }
    }

    /// Restrict every projection to one recorder name.
    pub fn with_recorder_filter(mut self, recorder: Option<String>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Spawn the projection loop.
    ///
    /// The first snapshot is sent immediately; later ones follow every record
    /// or mode change. The loop exits when the record subscription closes or
    /// the receiver is dropped.
    pub fn start(self) -> (mpsc::Receiver<ProjectionSnapshot>, ProjectionHandle) {
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move {
            self.projection_loop(tx).await;
        });
        (rx, ProjectionHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn projection_loop(mut self, tx: mpsc::Sender<ProjectionSnapshot>) {
        let mut mode_open = true;

        loop {
            let snapshot = self.current_snapshot();
            tracing::debug!(
                mode = %snapshot.mode,
                rows = snapshot.records.len(),
                "sending projection snapshot"
            );
            if tx.send(snapshot).await.is_err() {
                tracing::debug!("projection channel closed; exiting loop");
                break;
            }

            tokio::select! {
                changed = self.records.changed() => {
                    if changed.is_err() {
                        tracing::debug!("record subscription closed; exiting loop");
                        break;
                    }
                }
                changed = self.mode.changed(), if mode_open => {
                    if changed.is_err() {
                        // Mode is fixed from here on; keep following records.
                        mode_open = false;
                    }
                }
            }
        }
    }

    fn current_snapshot(&mut self) -> ProjectionSnapshot {
        let mode = self.mode.borrow_and_update().clone();
        let records = self.records.borrow_and_update();
        ProjectionSnapshot::build(&records, &mode, self.recorder.as_deref())
    }
}

// ── ProjectionHandle ──────────────────────────────────────────────────────────

/// A handle to the background projection task.
pub struct ProjectionHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl ProjectionHandle {
    /// Immediately abort the projection loop.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
