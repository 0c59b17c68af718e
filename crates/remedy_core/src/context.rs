//! Per-run state owned by the engine.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkpoint::CheckpointManager;
use crate::error::CoreResult;
use crate::store::IssueStore;
use crate::validation::Baseline;

/// Run counters. Reset for every run and only changed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub issues_found: usize,
    pub issues_fixed: usize,
    pub issues_rolled_back: usize,
    pub issues_failed: usize,
    pub files_modified: usize,
    pub checkpoints_taken: usize,
    pub elapsed_ms: u64,
}

/// Cooperative stop flag, checked between tasks and batches.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mutable state for one run: store, metrics, checkpoints and baseline.
#[derive(Debug)]
pub struct RunContext {
    pub(crate) run_id: Uuid,
    pub(crate) root: PathBuf,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) started: Instant,
    pub(crate) store: IssueStore,
    pub(crate) metrics: Metrics,
    pub(crate) checkpoints: CheckpointManager,
    pub(crate) baseline: Baseline,
    pub(crate) modified_files: BTreeSet<PathBuf>,
    pub(crate) abort: AbortSignal,
}

impl RunContext {
    pub fn new(root: impl Into<PathBuf>, abort: AbortSignal) -> CoreResult<Self> {
        let root = root.into();
        Ok(Self {
            run_id: Uuid::new_v4(),
            checkpoints: CheckpointManager::new(&root)?,
            root,
            started_at: Utc::now(),
            started: Instant::now(),
            store: IssueStore::new(),
            metrics: Metrics::default(),
            baseline: Baseline::empty(),
            modified_files: BTreeSet::new(),
            abort,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &IssueStore {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    pub(crate) fn record_modified(&mut self, files: impl IntoIterator<Item = PathBuf>) {
        self.modified_files.extend(files);
        self.metrics.files_modified = self.modified_files.len();
    }

    pub(crate) fn tick(&mut self) {
        self.metrics.elapsed_ms = self.started.elapsed().as_millis() as u64;
    }
}
