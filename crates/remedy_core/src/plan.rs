//! Execution plan produced by the task planner.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fix::FixHandler;
use crate::issue::IssueId;
use crate::risk::FixRisk;
use crate::task::{Task, TaskId};

/// Tasks with pairwise-disjoint footprints that may run together.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub index: usize,
    pub tasks: Vec<Task>,
}

/// Why an auto-fixable issue will not be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ManualReason {
    FixRiskTooHigh { risk: FixRisk, detail: String },
    MissingHandler { issue_type: String },
    UnsupportedFix { handler: String, kind: String },
    OrderingCycle { cycle: Vec<TaskId> },
}

impl ManualReason {
    pub fn describe(&self) -> String {
        match self {
            ManualReason::FixRiskTooHigh { risk, detail } => {
                format!("fix risk {} exceeds ceiling ({})", risk, detail)
            }
            ManualReason::MissingHandler { issue_type } => {
                format!("no fix handler registered for '{}'", issue_type)
            }
            ManualReason::UnsupportedFix { handler, kind } => {
                format!("handler '{}' cannot apply '{}' fixes", handler, kind)
            }
            ManualReason::OrderingCycle { cycle } => {
                let ids: Vec<&str> = cycle.iter().map(|id| id.as_str()).collect();
                format!("ordering cycle: {}", ids.join(" -> "))
            }
        }
    }
}

/// An issue reported for manual remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEntry {
    pub issue_id: IssueId,
    #[serde(flatten)]
    pub reason: ManualReason,
}

/// Handlers resolved at plan time, keyed by task.
#[derive(Clone, Default)]
pub struct HandlerBindings {
    handlers: HashMap<TaskId, Arc<dyn FixHandler>>,
}

impl HandlerBindings {
    pub fn bind(&mut self, task: TaskId, handler: Arc<dyn FixHandler>) {
        self.handlers.insert(task, handler);
    }

    pub fn get(&self, task: &TaskId) -> Option<Arc<dyn FixHandler>> {
        self.handlers.get(task).cloned()
    }

    pub fn remove(&mut self, task: &TaskId) {
        self.handlers.remove(task);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBindings")
            .field("tasks", &self.handlers.len())
            .finish()
    }
}

/// Ordered batches plus the issues left for humans.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionPlan {
    pub batches: Vec<Batch>,
    pub manual: Vec<ManualEntry>,
    /// Issues with no automatic fix at all.
    pub unfixable: Vec<IssueId>,
    #[serde(skip)]
    pub(crate) handlers: HandlerBindings,
}

impl ExecutionPlan {
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.batches.iter().flat_map(|b| b.tasks.iter())
    }

    pub fn task_count(&self) -> usize {
        self.batches.iter().map(|b| b.tasks.len()).sum()
    }

    pub fn task_for_issue(&self, issue: &IssueId) -> Option<&Task> {
        self.tasks().find(|t| &t.issue_id == issue)
    }

    pub fn manual_for_issue(&self, issue: &IssueId) -> Option<&ManualEntry> {
        self.manual.iter().find(|m| &m.issue_id == issue)
    }

    pub fn handler_for(&self, task: &TaskId) -> Option<Arc<dyn FixHandler>> {
        self.handlers.get(task)
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Human-readable outline of the plan.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} task(s) in {} batch(es), {} manual-only, {} unfixable",
            self.task_count(),
            self.batches.len(),
            self.manual.len(),
            self.unfixable.len()
        );
        for batch in &self.batches {
            let _ = writeln!(out, "  Batch {}:", batch.index + 1);
            for task in &batch.tasks {
                let _ = writeln!(
                    out,
                    "    - {} (priority {:.2}, risk {}, handler {})",
                    task.id, task.priority, task.fix_risk, task.handler
                );
            }
        }
        for entry in &self.manual {
            let _ = writeln!(out, "  Manual: {} - {}", entry.issue_id, entry.reason.describe());
        }
        out
    }
}
