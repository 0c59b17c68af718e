//! Remediation engine.
//!
//! The engine is a typestate machine:
//!
//! ```text
//! Idle -> BaselineEstablished -> Analyzed -> Planned -> (Executing) -> Complete
//! ```
//!
//! Each phase consumes the engine and returns it in the next state, so calling
//! phases out of order does not compile. Execution is transactional per task:
//! snapshot, apply, validate, then commit or restore.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::analyzer::{run_analyzers, Analyzer};
use crate::context::{AbortSignal, RunContext};
use crate::error::{CoreError, CoreResult};
use crate::fix::{FixHandler, FixWorkspace};
use crate::issue::{FixDescriptor, Issue};
use crate::plan::{ExecutionPlan, HandlerBindings};
use crate::planner::{PlannerConfig, TaskPlanner};
use crate::registry::FixRegistry;
use crate::report::{AnalyzerSummary, RunPhase, RunReport};
use crate::risk::{RiskAssessor, RiskConfig};
use crate::store::IssueStore;
use crate::task::{Task, TaskId, TaskStatus};
use crate::validation::{Baseline, ValidationResult, Validator};

/// How tasks inside a batch are run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One task at a time, validated after each.
    #[default]
    Sequential,
    /// Every task of a batch applied together and validated once.
    Batched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Per-analyzer time limit.
    pub timeout_secs: u64,
    /// Analyzer names to skip.
    pub disabled: BTreeSet<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            disabled: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Per-fix time limit.
    pub fix_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            fix_timeout_secs: 60,
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analysis: AnalysisConfig,
    pub risk: RiskConfig,
    pub planner: PlannerConfig,
    pub execution: ExecutionConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.analysis.timeout_secs == 0 {
            return Err(CoreError::InvalidConfiguration(
                "analysis.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.execution.fix_timeout_secs == 0 {
            return Err(CoreError::InvalidConfiguration(
                "execution.fix_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.risk.validate()?;
        self.planner.validate()
    }
}

/// Progress notification published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    PhaseStarted { phase: RunPhase },
    AnalyzerFinished { analyzer: String, issues: usize, degraded: bool },
    PlanReady { batches: usize, tasks: usize, manual: usize },
    BatchStarted { index: usize, tasks: usize },
    TaskStarted { task: TaskId },
    TaskFinished { task: TaskId, status: TaskStatus },
    Aborted { remaining: usize },
    Completed { fixed: usize, rolled_back: usize, failed: usize },
}

/// Callback receiving [`EngineEvent`]s.
pub type EventHandler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Engine before the baseline has been taken.
pub struct Idle;

/// Baseline known; ready to analyze.
pub struct BaselineEstablished;

/// Issues collected in the store.
pub struct Analyzed {
    analyzers: Vec<AnalyzerSummary>,
}

/// Plan built; ready to execute.
pub struct Planned {
    analyzers: Vec<AnalyzerSummary>,
    plan: ExecutionPlan,
}

/// Execution finished or stopped by the abort signal.
pub struct Complete {
    plan: ExecutionPlan,
    report: RunReport,
}

struct Components {
    analyzers: Vec<Arc<dyn Analyzer>>,
    registry: Arc<FixRegistry>,
    validator: Arc<dyn Validator>,
    assessor: RiskAssessor,
    config: EngineConfig,
    events: Option<EventHandler>,
}

impl Components {
    fn emit(&self, event: EngineEvent) {
        if let Some(handler) = &self.events {
            handler(&event);
        }
    }

    fn fix_timeout(&self) -> Duration {
        Duration::from_secs(self.config.execution.fix_timeout_secs)
    }
}

/// Builder for [`Engine<Idle>`].
pub struct EngineBuilder {
    root: PathBuf,
    analyzers: Vec<Arc<dyn Analyzer>>,
    registry: FixRegistry,
    validator: Option<Arc<dyn Validator>>,
    config: EngineConfig,
    events: Option<EventHandler>,
    abort: AbortSignal,
}

impl EngineBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            analyzers: Vec::new(),
            registry: FixRegistry::new(),
            validator: None,
            config: EngineConfig::default(),
            events: None,
            abort: AbortSignal::new(),
        }
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzers.push(analyzer);
        self
    }

    pub fn analyzers(mut self, analyzers: impl IntoIterator<Item = Arc<dyn Analyzer>>) -> Self {
        self.analyzers.extend(analyzers);
        self
    }

    pub fn fix_registry(mut self, registry: FixRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn on_event(mut self, handler: impl Fn(&EngineEvent) + Send + Sync + 'static) -> Self {
        self.events = Some(Arc::new(handler));
        self
    }

    pub fn abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn build(self) -> CoreResult<Engine<Idle>> {
        self.config.validate()?;
        if !self.root.is_dir() {
            return Err(CoreError::InvalidConfiguration(format!(
                "repository root is not a directory: {}",
                self.root.display()
            )));
        }
        let validator = self
            .validator
            .ok_or_else(|| CoreError::InvalidConfiguration("a validator is required".to_string()))?;
        let assessor = RiskAssessor::new(self.config.risk.clone())?;

        let disabled = &self.config.analysis.disabled;
        let analyzers: Vec<Arc<dyn Analyzer>> = self
            .analyzers
            .into_iter()
            .filter(|a| {
                let enabled = !disabled.contains(a.name());
                if !enabled {
                    debug!("Analyzer {} disabled by configuration", a.name());
                }
                enabled
            })
            .collect();

        let ctx = RunContext::new(self.root, self.abort)?;
        Ok(Engine {
            parts: Components {
                analyzers,
                registry: Arc::new(self.registry),
                validator,
                assessor,
                config: self.config,
                events: self.events,
            },
            ctx,
            state: Idle,
        })
    }
}

/// The remediation engine in state `S`.
pub struct Engine<S> {
    parts: Components,
    ctx: RunContext,
    state: S,
}

impl<S> Engine<S> {
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    fn into_state<T>(self, state: T) -> Engine<T> {
        Engine {
            parts: self.parts,
            ctx: self.ctx,
            state,
        }
    }
}

impl Engine<Idle> {
    pub fn builder(root: impl Into<PathBuf>) -> EngineBuilder {
        EngineBuilder::new(root)
    }

    /// Run the validation battery once to record pre-existing diagnostics.
    pub async fn establish_baseline(mut self) -> CoreResult<Engine<BaselineEstablished>> {
        self.parts.emit(EngineEvent::PhaseStarted {
            phase: RunPhase::BaselineEstablished,
        });
        info!("Establishing validation baseline for {}", self.ctx.root.display());

        let result = match self
            .parts
            .validator
            .validate(&self.ctx.root, &Baseline::empty())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Baseline validation errored: {}", e);
                ValidationResult::errored(e.to_string())
            }
        };
        self.ctx.baseline = Baseline::from_result(&result);

        if !self.ctx.baseline.failing_checks.is_empty() {
            let failing: Vec<&str> = self.ctx.baseline.failing_checks.iter().map(|s| s.as_str()).collect();
            warn!(
                "{} check(s) already failing at baseline: {}",
                failing.len(),
                failing.join(", ")
            );
        }
        if !self.ctx.baseline.unchecked.is_empty() {
            let unchecked: Vec<&str> = self.ctx.baseline.unchecked.iter().map(|s| s.as_str()).collect();
            warn!(
                "{} check(s) skipped at baseline, their failures will never be tolerated: {}",
                unchecked.len(),
                unchecked.join(", ")
            );
        }
        info!(
            "Baseline recorded {} diagnostic(s)",
            self.ctx.baseline.diagnostics.len()
        );
        self.ctx.tick();
        Ok(self.into_state(BaselineEstablished))
    }

    /// Skip the baseline. Every diagnostic seen later counts as new.
    pub fn without_baseline(self) -> Engine<BaselineEstablished> {
        warn!("Running without a validation baseline");
        self.into_state(BaselineEstablished)
    }

    /// Baseline, analyze, plan and execute in one go.
    pub async fn run(self) -> CoreResult<Engine<Complete>> {
        self.establish_baseline().await?.analyze().await?.plan()?.execute().await
    }
}

impl Engine<BaselineEstablished> {
    /// Run every analyzer concurrently and fill the issue store.
    pub async fn analyze(mut self) -> CoreResult<Engine<Analyzed>> {
        self.parts.emit(EngineEvent::PhaseStarted {
            phase: RunPhase::Analyzed,
        });
        let limit = Duration::from_secs(self.parts.config.analysis.timeout_secs);
        info!("Running {} analyzers", self.parts.analyzers.len());

        let results = run_analyzers(&self.parts.analyzers, &self.ctx.root, limit).await;

        let summaries: Vec<AnalyzerSummary> = results
            .iter()
            .zip(self.parts.analyzers.iter())
            .map(|(result, analyzer)| AnalyzerSummary {
                name: result.analyzer.clone(),
                capabilities: analyzer.capabilities().iter().map(|c| c.to_string()).collect(),
                issues: result.issues.len(),
                files_scanned: result.metrics.files_scanned,
                duration_ms: result.metrics.duration_ms,
                degraded: result.degraded,
            })
            .collect();
        for summary in &summaries {
            self.parts.emit(EngineEvent::AnalyzerFinished {
                analyzer: summary.name.clone(),
                issues: summary.issues,
                degraded: summary.degraded,
            });
        }

        self.ctx.store = IssueStore::from_results(&results);
        self.ctx.metrics.issues_found = self.ctx.store.len();
        self.ctx.tick();
        info!("Analysis found {} unique issues", self.ctx.store.len());

        Ok(self.into_state(Analyzed {
            analyzers: summaries,
        }))
    }
}

impl Engine<Analyzed> {
    pub fn store(&self) -> &IssueStore {
        &self.ctx.store
    }

    pub fn analyzers(&self) -> &[AnalyzerSummary] {
        &self.state.analyzers
    }

    /// Report of the analysis alone.
    pub fn report(&self) -> RunReport {
        RunReport::build(&self.ctx, RunPhase::Analyzed, &self.state.analyzers, None, false)
    }

    /// Score issues and build the execution plan.
    pub fn plan(mut self) -> CoreResult<Engine<Planned>> {
        self.parts.emit(EngineEvent::PhaseStarted {
            phase: RunPhase::Planned,
        });
        let plan = TaskPlanner::new(
            &self.parts.assessor,
            &self.parts.registry,
            &self.parts.config.planner,
        )
        .plan(&self.ctx.store)?;

        self.parts.emit(EngineEvent::PlanReady {
            batches: plan.batches.len(),
            tasks: plan.task_count(),
            manual: plan.manual.len(),
        });
        self.ctx.tick();
        let analyzers = std::mem::take(&mut self.state.analyzers);
        Ok(self.into_state(Planned { analyzers, plan }))
    }
}

impl Engine<Planned> {
    pub fn execution_plan(&self) -> &ExecutionPlan {
        &self.state.plan
    }

    /// Report of the plan without executing it.
    pub fn report(&self) -> RunReport {
        RunReport::build(
            &self.ctx,
            RunPhase::Planned,
            &self.state.analyzers,
            Some(&self.state.plan),
            false,
        )
    }

    /// Execute the plan batch by batch.
    ///
    /// A failing task never stops the run. A failed restore does: it is
    /// returned as [`CoreError::RestoreFailed`].
    pub async fn execute(self) -> CoreResult<Engine<Complete>> {
        let Engine { parts, mut ctx, state } = self;
        let Planned {
            analyzers,
            mut plan,
        } = state;

        parts.emit(EngineEvent::PhaseStarted {
            phase: RunPhase::Executing,
        });
        info!(
            "Executing {} task(s) in {} batch(es) ({:?} mode)",
            plan.task_count(),
            plan.batches.len(),
            parts.config.execution.mode
        );

        let handlers = plan.handlers.clone();
        let mut aborted = false;

        'batches: for batch in plan.batches.iter_mut() {
            if ctx.abort.is_aborted() {
                aborted = true;
                break;
            }
            parts.emit(EngineEvent::BatchStarted {
                index: batch.index,
                tasks: batch.tasks.len(),
            });
            debug!("Starting batch {}", batch.index);

            match parts.config.execution.mode {
                ExecutionMode::Sequential => {
                    for task in batch.tasks.iter_mut() {
                        if ctx.abort.is_aborted() {
                            aborted = true;
                            break 'batches;
                        }
                        run_task(&parts, &mut ctx, &handlers, task)
                            .await
                            .map_err(halt)?;
                    }
                }
                ExecutionMode::Batched => {
                    run_batch(&parts, &mut ctx, &handlers, &mut batch.tasks)
                        .await
                        .map_err(halt)?;
                }
            }
        }

        if aborted {
            let remaining = plan
                .tasks()
                .filter(|t| t.status() == TaskStatus::Pending)
                .count();
            warn!("Run aborted; {} task(s) not attempted", remaining);
            parts.emit(EngineEvent::Aborted { remaining });
        }

        ctx.tick();
        parts.emit(EngineEvent::Completed {
            fixed: ctx.metrics.issues_fixed,
            rolled_back: ctx.metrics.issues_rolled_back,
            failed: ctx.metrics.issues_failed,
        });
        info!(
            "Run complete: {} fixed, {} rolled back, {} failed",
            ctx.metrics.issues_fixed, ctx.metrics.issues_rolled_back, ctx.metrics.issues_failed
        );

        let report = RunReport::build(&ctx, RunPhase::Complete, &analyzers, Some(&plan), aborted);
        Ok(Engine {
            parts,
            ctx,
            state: Complete { plan, report },
        })
    }
}

impl Engine<Complete> {
    pub fn report(&self) -> &RunReport {
        &self.state.report
    }

    pub fn execution_plan(&self) -> &ExecutionPlan {
        &self.state.plan
    }

    pub fn into_report(self) -> RunReport {
        self.state.report
    }
}

fn halt(err: CoreError) -> CoreError {
    if err.is_fatal() {
        error!("Halting run: {}", err);
    }
    err
}

/// Everything a task needs to run, resolved from the store and plan.
struct Prepared {
    issue: Issue,
    fix: FixDescriptor,
    handler: Arc<dyn FixHandler>,
}

fn prepare(ctx: &RunContext, handlers: &HandlerBindings, task: &Task) -> Result<Prepared, String> {
    let issue = ctx
        .store
        .get(&task.issue_id)
        .cloned()
        .ok_or_else(|| format!("issue {} is no longer in the store", task.issue_id))?;
    let fix = issue
        .fix
        .clone()
        .ok_or_else(|| format!("issue {} has no fix descriptor", task.issue_id))?;
    let handler = handlers
        .get(&task.id)
        .ok_or_else(|| format!("no handler bound to {}", task.id))?;
    Ok(Prepared { issue, fix, handler })
}

/// Snapshot the footprint and move the task to running.
///
/// A task that cannot be prepared or snapshotted is failed before it starts.
fn start(
    parts: &Components,
    ctx: &mut RunContext,
    handlers: &HandlerBindings,
    task: &mut Task,
) -> CoreResult<Option<Prepared>> {
    parts.emit(EngineEvent::TaskStarted {
        task: task.id.clone(),
    });

    let prepared = match prepare(ctx, handlers, task) {
        Ok(prepared) => prepared,
        Err(detail) => {
            finish(parts, ctx, task, TaskStatus::Failed, Some(detail))?;
            return Ok(None);
        }
    };

    let checkpoint = match ctx
        .checkpoints
        .snapshot(&task.footprint, &ctx.metrics, Some(&task.id))
    {
        Ok(id) => id,
        Err(e) => {
            warn!("Could not checkpoint {}: {}", task.id, e);
            finish(parts, ctx, task, TaskStatus::Failed, Some(e.to_string()))?;
            return Ok(None);
        }
    };
    ctx.metrics.checkpoints_taken += 1;
    task.checkpoint = Some(checkpoint);
    task.transition(TaskStatus::Running)?;
    Ok(Some(prepared))
}

async fn apply(prepared: &Prepared, workspace: &mut FixWorkspace, limit: Duration) -> Result<(), String> {
    match timeout(limit, prepared.handler.apply(&prepared.issue, &prepared.fix, workspace)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("fix timed out after {:?}", limit)),
    }
}

async fn validate(parts: &Components, ctx: &RunContext) -> ValidationResult {
    match parts.validator.validate(&ctx.root, &ctx.baseline).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Validation errored: {}", e);
            ValidationResult::errored(e.to_string())
        }
    }
}

fn restore(ctx: &RunContext, task: &Task) -> CoreResult<()> {
    match task.checkpoint {
        Some(id) => ctx.checkpoints.restore(&id),
        None => Err(CoreError::CheckpointNotFound(format!("no checkpoint for {}", task.id))),
    }
}

fn finish(
    parts: &Components,
    ctx: &mut RunContext,
    task: &mut Task,
    status: TaskStatus,
    detail: Option<String>,
) -> CoreResult<()> {
    task.finish(status, detail)?;
    match status {
        TaskStatus::Committed => ctx.metrics.issues_fixed += 1,
        TaskStatus::RolledBack => ctx.metrics.issues_rolled_back += 1,
        TaskStatus::Failed => ctx.metrics.issues_failed += 1,
        TaskStatus::Pending | TaskStatus::Running => {}
    }
    ctx.tick();

    match &task.detail {
        Some(detail) => info!("Task {} {}: {}", task.id, status, detail),
        None => info!("Task {} {}", task.id, status),
    }
    parts.emit(EngineEvent::TaskFinished {
        task: task.id.clone(),
        status,
    });
    Ok(())
}

async fn run_task(
    parts: &Components,
    ctx: &mut RunContext,
    handlers: &HandlerBindings,
    task: &mut Task,
) -> CoreResult<()> {
    let Some(prepared) = start(parts, ctx, handlers, task)? else {
        return Ok(());
    };

    let mut workspace = FixWorkspace::new(&ctx.root, task.footprint.clone());
    if let Err(detail) = apply(&prepared, &mut workspace, parts.fix_timeout()).await {
        warn!("Fix {} failed: {}", task.id, detail);
        restore(ctx, task)?;
        return finish(parts, ctx, task, TaskStatus::Failed, Some(detail));
    }

    let validation = validate(parts, ctx).await;
    if validation.passed {
        ctx.record_modified(workspace.modified().iter().cloned());
        ctx.baseline = Baseline::from_result(&validation);
        finish(parts, ctx, task, TaskStatus::Committed, None)
    } else {
        restore(ctx, task)?;
        finish(parts, ctx, task, TaskStatus::RolledBack, Some(validation.summary()))
    }
}

async fn run_batch(
    parts: &Components,
    ctx: &mut RunContext,
    handlers: &HandlerBindings,
    tasks: &mut [Task],
) -> CoreResult<()> {
    let limit = parts.fix_timeout();
    let mut jobs = Vec::new();
    for (index, task) in tasks.iter_mut().enumerate() {
        let Some(prepared) = start(parts, ctx, handlers, task)? else {
            continue;
        };
        let mut workspace = FixWorkspace::new(&ctx.root, task.footprint.clone());
        jobs.push(async move {
            let outcome = apply(&prepared, &mut workspace, limit).await;
            (index, outcome, workspace)
        });
    }

    let mut applied = Vec::new();
    for (index, outcome, workspace) in futures::future::join_all(jobs).await {
        let task = &mut tasks[index];
        match outcome {
            Ok(()) => applied.push((index, workspace)),
            Err(detail) => {
                warn!("Fix {} failed: {}", task.id, detail);
                restore(ctx, task)?;
                finish(parts, ctx, task, TaskStatus::Failed, Some(detail))?;
            }
        }
    }
    if applied.is_empty() {
        return Ok(());
    }

    let validation = validate(parts, ctx).await;
    if validation.passed {
        for (index, workspace) in &applied {
            ctx.record_modified(workspace.modified().iter().cloned());
            finish(parts, ctx, &mut tasks[*index], TaskStatus::Committed, None)?;
        }
        ctx.baseline = Baseline::from_result(&validation);
    } else {
        let detail = validation.summary();
        for (index, _) in applied.iter().rev() {
            let task = &mut tasks[*index];
            restore(ctx, task)?;
            finish(parts, ctx, task, TaskStatus::RolledBack, Some(detail.clone()))?;
        }
    }
    Ok(())
}
