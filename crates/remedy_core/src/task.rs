//! Remediation tasks and their lifecycle.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointId;
use crate::error::{CoreError, CoreResult};
use crate::issue::{Issue, IssueId};
use crate::risk::FixRisk;

/// Stable task identifier, derived from the issue it fixes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn for_issue(issue: &IssueId) -> Self {
        Self(format!("fix:{}", issue))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task lifecycle state.
///
/// `pending → running → committed | rolledback | failed`, plus
/// `pending → failed` when a task cannot even start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Committed,
    RolledBack,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Committed | TaskStatus::RolledBack | TaskStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Committed)
                | (TaskStatus::Running, TaskStatus::RolledBack)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Committed => "committed",
            TaskStatus::RolledBack => "rolledback",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One planned fix for one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub issue_id: IssueId,
    pub issue_type: String,
    pub source_analyzer: String,
    /// Files the fix may touch; the unit of conflict detection.
    pub footprint: BTreeSet<PathBuf>,
    pub priority: f64,
    pub fix_risk: FixRisk,
    /// Name of the handler bound at plan time.
    pub handler: String,
    status: TaskStatus,
    #[serde(default)]
    pub checkpoint: Option<CheckpointId>,
    #[serde(default)]
    pub batch: Option<usize>,
    /// Reason for a failure or rollback.
    #[serde(default)]
    pub detail: Option<String>,
}

impl Task {
    pub fn new(issue: &Issue, priority: f64, fix_risk: FixRisk, handler: impl Into<String>) -> Self {
        Self {
            id: TaskId::for_issue(&issue.id),
            issue_id: issue.id.clone(),
            issue_type: issue.issue_type.clone(),
            source_analyzer: issue.source_analyzer.clone(),
            footprint: issue.footprint(),
            priority,
            fix_risk,
            handler: handler.into(),
            status: TaskStatus::Pending,
            checkpoint: None,
            batch: None,
            detail: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: TaskStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                task: self.id.to_string(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move to a terminal state and record why.
    pub fn finish(&mut self, next: TaskStatus, detail: Option<String>) -> CoreResult<()> {
        self.transition(next)?;
        self.detail = detail;
        Ok(())
    }

    pub fn conflicts_with(&self, other: &Task) -> bool {
        !self.footprint.is_disjoint(&other.footprint)
    }
}
