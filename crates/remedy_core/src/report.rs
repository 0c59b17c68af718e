//! Run report: every issue with its final disposition.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{Metrics, RunContext};
use crate::error::CoreResult;
use crate::issue::{IssueId, Severity};
use crate::plan::{ExecutionPlan, ManualEntry};
use crate::risk::FixRisk;
use crate::task::{TaskId, TaskStatus};

/// Phase the run had reached when the report was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    BaselineEstablished,
    Analyzed,
    Planned,
    Executing,
    Complete,
}

/// What happened to an issue by the end of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Fixed,
    RolledBack,
    Failed,
    ManualOnly,
    Unfixable,
    /// Planned but never run because the run was aborted.
    NotAttempted,
    /// Planned; execution has not happened yet.
    Planned,
    /// Found; no plan has been built yet.
    Open,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Fixed => "fixed",
            Disposition::RolledBack => "rolled back",
            Disposition::Failed => "failed",
            Disposition::ManualOnly => "manual-only",
            Disposition::Unfixable => "unfixable",
            Disposition::NotAttempted => "not attempted",
            Disposition::Planned => "planned",
            Disposition::Open => "open",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            Disposition::Fixed => "✅",
            Disposition::RolledBack => "↩️",
            Disposition::Failed => "❌",
            Disposition::ManualOnly => "✋",
            Disposition::Unfixable => "⚠️",
            Disposition::NotAttempted => "⏸️",
            Disposition::Planned => "📋",
            Disposition::Open => "🔍",
        }
    }
}

/// Per-analyzer summary for the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerSummary {
    pub name: String,
    pub capabilities: Vec<String>,
    pub issues: usize,
    pub files_scanned: usize,
    pub duration_ms: u64,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueReport {
    pub id: IssueId,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
    pub message: String,
    pub recommendation: String,
    pub reported_by: Vec<String>,
    pub disposition: Disposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub issue_id: IssueId,
    pub status: TaskStatus,
    pub batch: Option<usize>,
    pub priority: f64,
    pub fix_risk: FixRisk,
    pub handler: String,
    pub footprint: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineSummary {
    pub established: bool,
    pub diagnostics: usize,
    pub failing_checks: Vec<String>,
}

/// Final artifact of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub root: PathBuf,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub aborted: bool,
    pub metrics: Metrics,
    pub baseline: BaselineSummary,
    pub analyzers: Vec<AnalyzerSummary>,
    pub batches: usize,
    pub issues: Vec<IssueReport>,
    pub tasks: Vec<TaskReport>,
    pub manual: Vec<ManualEntry>,
    pub counts: BTreeMap<Disposition, usize>,
}

impl RunReport {
    pub(crate) fn build(
        ctx: &RunContext,
        phase: RunPhase,
        analyzers: &[AnalyzerSummary],
        plan: Option<&ExecutionPlan>,
        aborted: bool,
    ) -> Self {
        let issues: Vec<IssueReport> = ctx
            .store
            .stored()
            .map(|stored| {
                let issue = &stored.issue;
                let (disposition, note) = disposition_of(&issue.id, plan, phase);
                IssueReport {
                    id: issue.id.clone(),
                    issue_type: issue.issue_type.clone(),
                    severity: issue.severity,
                    file: issue.file.clone(),
                    line: issue.line,
                    message: issue.message.clone(),
                    recommendation: issue.recommendation.clone(),
                    reported_by: stored.reported_by.iter().cloned().collect(),
                    disposition,
                    note,
                }
            })
            .collect();

        let tasks = plan
            .map(|plan| {
                plan.tasks()
                    .map(|task| TaskReport {
                        id: task.id.clone(),
                        issue_id: task.issue_id.clone(),
                        status: task.status(),
                        batch: task.batch,
                        priority: task.priority,
                        fix_risk: task.fix_risk,
                        handler: task.handler.clone(),
                        footprint: task.footprint.iter().cloned().collect(),
                        checkpoint: task.checkpoint.map(|c| c.to_string()),
                        detail: task.detail.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut counts = BTreeMap::new();
        for issue in &issues {
            *counts.entry(issue.disposition).or_insert(0) += 1;
        }

        Self {
            run_id: ctx.run_id,
            root: ctx.root.clone(),
            phase,
            started_at: ctx.started_at,
            finished_at: Utc::now(),
            aborted,
            metrics: ctx.metrics.clone(),
            baseline: BaselineSummary {
                established: ctx.baseline.established,
                diagnostics: ctx.baseline.diagnostics.len(),
                failing_checks: ctx.baseline.failing_checks.iter().cloned().collect(),
            },
            analyzers: analyzers.to_vec(),
            batches: plan.map(|p| p.batches.len()).unwrap_or(0),
            issues,
            tasks,
            manual: plan.map(|p| p.manual.clone()).unwrap_or_default(),
            counts,
        }
    }

    pub fn count(&self, disposition: Disposition) -> usize {
        self.counts.get(&disposition).copied().unwrap_or(0)
    }

    /// High and critical issues that were not fixed.
    pub fn unresolved_blocking(&self) -> Vec<&IssueReport> {
        self.issues
            .iter()
            .filter(|i| i.severity.is_blocking() && i.disposition != Disposition::Fixed)
            .collect()
    }

    pub fn has_unresolved_blocking(&self) -> bool {
        !self.unresolved_blocking().is_empty()
    }

    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Human-readable report.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Remedy run {} ({})", self.run_id, self.root.display());
        let status = if self.aborted {
            "⏸️ ABORTED"
        } else if self.has_unresolved_blocking() {
            "❌ UNRESOLVED BLOCKING ISSUES"
        } else {
            "✅ CLEAN"
        };
        let _ = writeln!(out, "Phase: {:?}  Status: {}", self.phase, status);
        let _ = writeln!(out, "Duration: {}ms\n", self.metrics.elapsed_ms);

        if self.baseline.established {
            let _ = writeln!(
                out,
                "Baseline: {} diagnostic(s), failing checks: {}",
                self.baseline.diagnostics,
                if self.baseline.failing_checks.is_empty() {
                    "none".to_string()
                } else {
                    self.baseline.failing_checks.join(", ")
                }
            );
        }

        if !self.analyzers.is_empty() {
            out.push_str("Analyzers:\n");
            for a in &self.analyzers {
                let icon = if a.degraded { "⚠️" } else { "✅" };
                let _ = writeln!(
                    out,
                    "  {} {} - {} issue(s), {} file(s) ({}ms)",
                    icon, a.name, a.issues, a.files_scanned, a.duration_ms
                );
            }
        }

        if !self.issues.is_empty() {
            out.push_str("\nIssues:\n");
            for issue in &self.issues {
                let location = match (&issue.file, issue.line) {
                    (Some(f), Some(l)) => format!("{}:{}", f.display(), l),
                    (Some(f), None) => f.display().to_string(),
                    _ => "-".to_string(),
                };
                let _ = writeln!(
                    out,
                    "  {} [{}] {} at {} - {} ({})",
                    issue.disposition.icon(),
                    issue.severity,
                    issue.issue_type,
                    location,
                    issue.message,
                    issue.disposition.as_str()
                );
                if let Some(note) = &issue.note {
                    let truncated: String = note.chars().take(500).collect();
                    let _ = writeln!(out, "     {}", truncated);
                }
            }
        }

        let m = &self.metrics;
        let _ = writeln!(
            out,
            "\nSummary: {} found, {} fixed, {} rolled back, {} failed, {} manual-only, {} unfixable",
            m.issues_found,
            m.issues_fixed,
            m.issues_rolled_back,
            m.issues_failed,
            self.count(Disposition::ManualOnly),
            self.count(Disposition::Unfixable)
        );
        let _ = write!(
            out,
            "Files modified: {}, checkpoints: {}, batches: {}",
            m.files_modified, m.checkpoints_taken, self.batches
        );
        out
    }
}

fn disposition_of(
    issue: &IssueId,
    plan: Option<&ExecutionPlan>,
    phase: RunPhase,
) -> (Disposition, Option<String>) {
    let Some(plan) = plan else {
        return (Disposition::Open, None);
    };
    if let Some(task) = plan.task_for_issue(issue) {
        let disposition = match task.status() {
            TaskStatus::Committed => Disposition::Fixed,
            TaskStatus::RolledBack => Disposition::RolledBack,
            TaskStatus::Failed | TaskStatus::Running => Disposition::Failed,
            TaskStatus::Pending if phase == RunPhase::Complete => Disposition::NotAttempted,
            TaskStatus::Pending => Disposition::Planned,
        };
        return (disposition, task.detail.clone());
    }
    if let Some(entry) = plan.manual_for_issue(issue) {
        return (Disposition::ManualOnly, Some(entry.reason.describe()));
    }
    (Disposition::Unfixable, None)
}
