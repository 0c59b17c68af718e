//! Checkpoints: byte-exact snapshots of task footprints.
//!
//! Every snapshot records the contents (or absence) of each footprint file in
//! a private temporary directory owned by the manager. Restores stage every
//! file next to its target before any rename, so a failure during staging
//! leaves the repository untouched.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::context::Metrics;
use crate::error::{CoreError, CoreResult};
use crate::fix::relative_to;
use crate::task::TaskId;

/// Unique checkpoint identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(Uuid);

impl CheckpointId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One file captured by a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    /// Root-relative path of the file.
    pub path: PathBuf,
    /// Stored copy, or `None` if the file did not exist.
    pub stored: Option<PathBuf>,
}

/// Where a snapshot's bytes live.
#[derive(Debug, Clone, Serialize)]
pub struct StateRef {
    pub dir: PathBuf,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub timestamp: DateTime<Utc>,
    pub task: Option<TaskId>,
    pub state_ref: StateRef,
    pub preceding_metrics: Metrics,
}

/// Stack of checkpoints for one run.
#[derive(Debug)]
pub struct CheckpointManager {
    root: PathBuf,
    storage: TempDir,
    stack: Vec<Checkpoint>,
}

impl CheckpointManager {
    pub fn new(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let storage = tempfile::Builder::new().prefix("remedy-checkpoints-").tempdir()?;
        Ok(Self {
            root: root.into(),
            storage,
            stack: Vec::new(),
        })
    }

    /// Capture the current bytes of every footprint file.
    pub fn snapshot(
        &mut self,
        footprint: &BTreeSet<PathBuf>,
        metrics: &Metrics,
        task: Option<&TaskId>,
    ) -> CoreResult<CheckpointId> {
        let id = CheckpointId::new();
        let dir = self.storage.path().join(id.to_string());
        fs::create_dir_all(&dir)
            .map_err(|e| CoreError::SnapshotFailed(format!("{}: {}", dir.display(), e)))?;

        let mut entries = Vec::with_capacity(footprint.len());
        for (index, path) in footprint.iter().enumerate() {
            let relative = relative_to(&self.root, path);
            let source = self.root.join(&relative);
            let stored = if source.is_file() {
                let blob = dir.join(format!("{}.blob", index));
                fs::copy(&source, &blob).map_err(|e| {
                    CoreError::SnapshotFailed(format!("{}: {}", relative.display(), e))
                })?;
                Some(blob)
            } else if source.exists() {
                return Err(CoreError::SnapshotFailed(format!(
                    "{} is not a regular file",
                    relative.display()
                )));
            } else {
                None
            };
            entries.push(SnapshotEntry {
                path: relative,
                stored,
            });
        }

        debug!("Checkpoint {} captured {} files", id, entries.len());
        self.stack.push(Checkpoint {
            id,
            timestamp: Utc::now(),
            task: task.cloned(),
            state_ref: StateRef { dir, entries },
            preceding_metrics: metrics.clone(),
        });
        Ok(id)
    }

    /// Put every file of the checkpoint back exactly as captured.
    ///
    /// Any failure is returned as [`CoreError::RestoreFailed`].
    pub fn restore(&self, id: &CheckpointId) -> CoreResult<()> {
        let checkpoint = self
            .get(id)
            .ok_or_else(|| CoreError::CheckpointNotFound(id.to_string()))?;

        let restore_failed = |message: String| {
            error!("Restore of checkpoint {} failed: {}", id, message);
            CoreError::RestoreFailed {
                checkpoint: id.to_string(),
                message,
            }
        };

        let mut staged: Vec<(PathBuf, Option<PathBuf>)> = Vec::new();
        for entry in &checkpoint.state_ref.entries {
            let target = self.root.join(&entry.path);
            match &entry.stored {
                Some(blob) => match stage(blob, &target) {
                    Ok(staging) => staged.push((target, Some(staging))),
                    Err(e) => {
                        discard(&staged);
                        return Err(restore_failed(format!("{}: {}", entry.path.display(), e)));
                    }
                },
                None => staged.push((target, None)),
            }
        }

        for (target, staging) in &staged {
            let outcome = match staging {
                Some(staging) => fs::rename(staging, target),
                None if target.exists() => fs::remove_file(target),
                None => Ok(()),
            };
            if let Err(e) = outcome {
                discard(&staged);
                return Err(restore_failed(format!("{}: {}", target.display(), e)));
            }
        }

        info!("Restored checkpoint {}", id);
        Ok(())
    }

    /// Restore every checkpoint taken after `id`, newest first, then `id` itself.
    pub fn rollback_to(&self, id: &CheckpointId) -> CoreResult<()> {
        let position = self
            .stack
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| CoreError::CheckpointNotFound(id.to_string()))?;

        for checkpoint in self.stack[position..].iter().rev() {
            self.restore(&checkpoint.id)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &CheckpointId) -> Option<&Checkpoint> {
        self.stack.iter().find(|c| &c.id == id)
    }

    /// Checkpoints in the order they were taken.
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.stack
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// Copy `blob` next to `target` under a hidden staging name.
fn stage(blob: &Path, target: &Path) -> std::io::Result<PathBuf> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let staging = target.with_file_name(format!(".{}.remedy-restore", name));
    fs::copy(blob, &staging)?;
    Ok(staging)
}

fn discard(staged: &[(PathBuf, Option<PathBuf>)]) {
    for staging in staged.iter().filter_map(|(_, s)| s.as_ref()) {
        let _ = fs::remove_file(staging);
    }
}
