//! End-to-end tests for the remediation engine using in-memory collaborators.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use remedy_core::{
    AbortSignal, AnalysisResult, Analyzer, Baseline, CheckKind, CheckOutcome, CoreError,
    CoreResult, Disposition, Engine, EngineConfig, EngineEvent, EvaluationPolicy, ExecutionMode,
    FixDescriptor, FixHandler, FixRegistry, FixWorkspace, Issue, Severity, TaskStatus,
    ValidationResult, Validator,
};

// ============================================================================
// Test collaborators
// ============================================================================

struct StaticAnalyzer {
    name: &'static str,
    issues: Vec<Issue>,
}

#[async_trait]
impl Analyzer for StaticAnalyzer {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["static"]
    }

    async fn analyze(&self, _root: &Path) -> CoreResult<AnalysisResult> {
        Ok(AnalysisResult::new(self.name).with_issues(self.issues.clone()))
    }
}

/// Adds `loading="lazy"` to the first bare `<img` in the target file.
struct LazyLoadingHandler;

#[async_trait]
impl FixHandler for LazyLoadingHandler {
    fn name(&self) -> &str {
        "lazy-loading"
    }

    async fn apply(&self, _issue: &Issue, fix: &FixDescriptor, ws: &mut FixWorkspace) -> CoreResult<()> {
        let FixDescriptor::InsertAttribute { file, .. } = fix else {
            return Err(CoreError::fix_failed(self.name(), "unexpected descriptor"));
        };
        let content = ws.read_to_string(file)?;
        let updated = content.replacen("<img src", "<img loading=\"lazy\" src", 1);
        ws.write(file, updated)
    }
}

/// Corrupts the file, then reports an error.
struct BrokenHandler;

#[async_trait]
impl FixHandler for BrokenHandler {
    fn name(&self) -> &str {
        "broken"
    }

    async fn apply(&self, _issue: &Issue, fix: &FixDescriptor, ws: &mut FixWorkspace) -> CoreResult<()> {
        for file in fix.footprint() {
            ws.write(&file, "half-written")?;
        }
        Err(CoreError::fix_failed(self.name(), "handler threw"))
    }
}

/// Tries to write a file outside its footprint.
struct EscapingHandler;

#[async_trait]
impl FixHandler for EscapingHandler {
    fn name(&self) -> &str {
        "escaping"
    }

    async fn apply(&self, _: &Issue, _: &FixDescriptor, ws: &mut FixWorkspace) -> CoreResult<()> {
        ws.write("unrelated.txt", "surprise")
    }
}

struct SleepyHandler;

#[async_trait]
impl FixHandler for SleepyHandler {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn apply(&self, _: &Issue, fix: &FixDescriptor, ws: &mut FixWorkspace) -> CoreResult<()> {
        for file in fix.footprint() {
            ws.write(&file, "partial")?;
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

type Rule = Box<dyn Fn(&Path) -> Vec<CheckOutcome> + Send + Sync>;

/// Validator driven by a closure over the repository contents.
struct ScriptedValidator {
    rule: Rule,
    calls: Mutex<usize>,
}

impl ScriptedValidator {
    fn new(rule: impl Fn(&Path) -> Vec<CheckOutcome> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            rule: Box::new(rule),
            calls: Mutex::new(0),
        })
    }

    fn passing() -> Arc<Self> {
        Self::new(|_| vec![CheckOutcome::passed("build", CheckKind::Build, "ok")])
    }

    fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    async fn validate(&self, root: &Path, baseline: &Baseline) -> CoreResult<ValidationResult> {
        *self.calls.lock() += 1;
        Ok(ValidationResult::evaluate(
            (self.rule)(root),
            baseline,
            EvaluationPolicy::default(),
        ))
    }
}

fn lazy_issue(file: &str, line: u32) -> Issue {
    Issue::new("missing_lazy_loading", Severity::Low, "performance", "image is not lazy-loaded")
        .at_file(file)
        .at_line(line)
        .with_fix(FixDescriptor::InsertAttribute {
            file: PathBuf::from(file),
            line,
            element: "img".to_string(),
            attribute: "loading".to_string(),
            value: "lazy".to_string(),
        })
}

fn repo_with(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }
    dir
}

fn registry(issue_type: &str, handler: Arc<dyn FixHandler>) -> FixRegistry {
    FixRegistry::new().with(issue_type, handler)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_single_lazy_loading_fix_is_committed() {
    let repo = repo_with(&[("index.html", "<body>\n<img src=\"a.png\">\n</body>\n")]);
    let validator = ScriptedValidator::passing();

    let engine = Engine::builder(repo.path())
        .analyzer(Arc::new(StaticAnalyzer {
            name: "performance",
            issues: vec![lazy_issue("index.html", 2)],
        }))
        .fix_registry(registry("missing_lazy_loading", Arc::new(LazyLoadingHandler)))
        .validator(validator.clone())
        .build()
        .unwrap();

    let planned = engine
        .establish_baseline()
        .await
        .unwrap()
        .analyze()
        .await
        .unwrap()
        .plan()
        .unwrap();
    assert_eq!(planned.execution_plan().batches.len(), 1);
    assert_eq!(planned.execution_plan().task_count(), 1);

    let complete = planned.execute().await.unwrap();
    let report = complete.report();

    assert_eq!(report.count(Disposition::Fixed), 1);
    assert_eq!(report.count(Disposition::RolledBack), 0);
    assert_eq!(report.metrics.issues_fixed, 1);
    assert_eq!(report.metrics.files_modified, 1);
    assert_eq!(report.metrics.checkpoints_taken, 1);
    assert_eq!(report.tasks[0].status, TaskStatus::Committed);
    assert!(!report.has_unresolved_blocking());
    assert_eq!(validator.calls(), 2);

    let content = fs::read_to_string(repo.path().join("index.html")).unwrap();
    assert!(content.contains("loading=\"lazy\""));
}

#[tokio::test]
async fn test_handler_error_fails_task_and_restores_file() {
    let original = "<img src=\"a.png\">\r\n<p>keep CRLF</p>\r\n";
    let repo = repo_with(&[("index.html", original)]);

    let complete = Engine::builder(repo.path())
        .analyzer(Arc::new(StaticAnalyzer {
            name: "performance",
            issues: vec![lazy_issue("index.html", 1)],
        }))
        .fix_registry(registry("missing_lazy_loading", Arc::new(BrokenHandler)))
        .validator(ScriptedValidator::passing())
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = complete.report();
    assert_eq!(report.count(Disposition::Failed), 1);
    assert_eq!(report.count(Disposition::Fixed), 0);
    assert_eq!(report.tasks[0].status, TaskStatus::Failed);
    assert!(report.tasks[0].detail.as_deref().unwrap().contains("handler threw"));
    assert_eq!(fs::read(repo.path().join("index.html")).unwrap(), original.as_bytes());
}

#[tokio::test]
async fn test_two_fixes_in_one_file_run_in_separate_batches() {
    let repo = repo_with(&[(
        "gallery.html",
        "<img src=\"a.png\">\n<img src=\"b.png\">\n",
    )]);

    let complete = Engine::builder(repo.path())
        .analyzer(Arc::new(StaticAnalyzer {
            name: "performance",
            issues: vec![lazy_issue("gallery.html", 1), lazy_issue("gallery.html", 2)],
        }))
        .fix_registry(registry("missing_lazy_loading", Arc::new(LazyLoadingHandler)))
        .validator(ScriptedValidator::passing())
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let plan = complete.execution_plan();
    assert_eq!(plan.batches.len(), 2);
    assert_eq!(plan.batches[0].tasks.len(), 1);
    assert_eq!(plan.batches[1].tasks.len(), 1);
    assert_eq!(complete.report().count(Disposition::Fixed), 2);

    let content = fs::read_to_string(repo.path().join("gallery.html")).unwrap();
    assert_eq!(content.matches("loading=\"lazy\"").count(), 2);
}

#[tokio::test]
async fn test_new_critical_diagnostic_rolls_back_even_when_checks_pass() {
    let original = "<img src=\"a.png\">\n";
    let repo = repo_with(&[("index.html", original)]);

    // Every check passes, but a lazy image triggers a brand-new diagnostic.
    let validator = ScriptedValidator::new(|root| {
        let content = fs::read_to_string(root.join("index.html")).unwrap_or_default();
        let diagnostics = if content.contains("lazy") {
            vec![Issue::new("TS9999", Severity::Critical, "validation:typecheck", "new error")
                .at_file("index.html")
                .at_line(1)]
        } else {
            Vec::new()
        };
        vec![CheckOutcome::passed("typecheck", CheckKind::TypeCheck, "exit 0").with_diagnostics(diagnostics)]
    });

    let complete = Engine::builder(repo.path())
        .analyzer(Arc::new(StaticAnalyzer {
            name: "performance",
            issues: vec![lazy_issue("index.html", 1)],
        }))
        .fix_registry(registry("missing_lazy_loading", Arc::new(LazyLoadingHandler)))
        .validator(validator)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = complete.report();
    assert_eq!(report.count(Disposition::RolledBack), 1);
    assert_eq!(report.metrics.issues_rolled_back, 1);
    assert_eq!(report.metrics.files_modified, 0);
    let detail = report.tasks[0].detail.as_deref().unwrap();
    assert!(detail.contains("new diagnostic"), "detail was: {}", detail);
    assert_eq!(fs::read_to_string(repo.path().join("index.html")).unwrap(), original);
}

#[tokio::test]
async fn test_writes_outside_footprint_fail_the_task() {
    let repo = repo_with(&[("index.html", "<img src=\"a.png\">\n")]);

    let complete = Engine::builder(repo.path())
        .analyzer(Arc::new(StaticAnalyzer {
            name: "performance",
            issues: vec![lazy_issue("index.html", 1)],
        }))
        .fix_registry(registry("missing_lazy_loading", Arc::new(EscapingHandler)))
        .validator(ScriptedValidator::passing())
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(complete.report().count(Disposition::Failed), 1);
    assert!(!repo.path().join("unrelated.txt").exists());
}

#[tokio::test]
async fn test_fix_timeout_fails_and_restores() {
    let original = "<img src=\"a.png\">\n";
    let repo = repo_with(&[("index.html", original)]);
    let mut config = EngineConfig::default();
    config.execution.fix_timeout_secs = 1;

    let complete = Engine::builder(repo.path())
        .analyzer(Arc::new(StaticAnalyzer {
            name: "performance",
            issues: vec![lazy_issue("index.html", 1)],
        }))
        .fix_registry(registry("missing_lazy_loading", Arc::new(SleepyHandler)))
        .validator(ScriptedValidator::passing())
        .config(config)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = complete.report();
    assert_eq!(report.count(Disposition::Failed), 1);
    assert!(report.tasks[0].detail.as_deref().unwrap().contains("timed out"));
    assert_eq!(fs::read_to_string(repo.path().join("index.html")).unwrap(), original);
}

#[tokio::test]
async fn test_abort_before_execution_leaves_tasks_not_attempted() {
    let repo = repo_with(&[("index.html", "<img src=\"a.png\">\n")]);
    let abort = AbortSignal::new();

    let planned = Engine::builder(repo.path())
        .analyzer(Arc::new(StaticAnalyzer {
            name: "performance",
            issues: vec![lazy_issue("index.html", 1)],
        }))
        .fix_registry(registry("missing_lazy_loading", Arc::new(LazyLoadingHandler)))
        .validator(ScriptedValidator::passing())
        .abort_signal(abort.clone())
        .build()
        .unwrap()
        .without_baseline()
        .analyze()
        .await
        .unwrap()
        .plan()
        .unwrap();

    abort.abort();
    let report = planned.execute().await.unwrap().into_report();
    assert!(report.aborted);
    assert_eq!(report.count(Disposition::NotAttempted), 1);
    assert_eq!(report.metrics.checkpoints_taken, 0);
}

#[tokio::test]
async fn test_batched_mode_rolls_back_whole_batch() {
    let repo = repo_with(&[
        ("a.html", "<img src=\"a.png\">\n"),
        ("b.html", "<img src=\"b.png\">\n"),
    ]);
    let validator = ScriptedValidator::new(|root| {
        let b = fs::read_to_string(root.join("b.html")).unwrap_or_default();
        if b.contains("lazy") {
            vec![CheckOutcome::failed("test", CheckKind::Test, "snapshot mismatch")]
        } else {
            vec![CheckOutcome::passed("test", CheckKind::Test, "ok")]
        }
    });
    let mut config = EngineConfig::default();
    config.execution.mode = ExecutionMode::Batched;

    let complete = Engine::builder(repo.path())
        .analyzer(Arc::new(StaticAnalyzer {
            name: "performance",
            issues: vec![lazy_issue("a.html", 1), lazy_issue("b.html", 1)],
        }))
        .fix_registry(registry("missing_lazy_loading", Arc::new(LazyLoadingHandler)))
        .validator(validator.clone())
        .config(config)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = complete.report();
    assert_eq!(report.batches, 1);
    assert_eq!(report.count(Disposition::RolledBack), 2);
    // Baseline plus one validation for the whole batch.
    assert_eq!(validator.calls(), 2);
    assert!(!fs::read_to_string(repo.path().join("a.html")).unwrap().contains("lazy"));
    assert!(!fs::read_to_string(repo.path().join("b.html")).unwrap().contains("lazy"));
}

#[tokio::test]
async fn test_events_and_report_dispositions() {
    let repo = repo_with(&[("index.html", "<img src=\"a.png\">\n")]);
    let events: Arc<Mutex<Vec<EngineEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let secret = Issue::new("hardcoded_secret", Severity::Critical, "security", "AWS key")
        .at_file("config.js")
        .at_line(3);
    let risky = lazy_issue("package.json", 1);

    let complete = Engine::builder(repo.path())
        .analyzer(Arc::new(StaticAnalyzer {
            name: "performance",
            issues: vec![lazy_issue("index.html", 1), risky],
        }))
        .analyzer(Arc::new(StaticAnalyzer {
            name: "security",
            issues: vec![secret],
        }))
        .fix_registry(registry("missing_lazy_loading", Arc::new(LazyLoadingHandler)))
        .validator(ScriptedValidator::passing())
        .on_event(move |event| sink.lock().push(event.clone()))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = complete.report();
    assert_eq!(report.count(Disposition::Fixed), 1);
    assert_eq!(report.count(Disposition::ManualOnly), 1);
    assert_eq!(report.count(Disposition::Unfixable), 1);
    assert!(report.has_unresolved_blocking());
    assert_eq!(report.unresolved_blocking()[0].issue_type, "hardcoded_secret");
    assert_eq!(report.analyzers.len(), 2);
    assert!(report.render_text().contains("hardcoded_secret"));
    assert!(report.to_json().unwrap().contains("\"disposition\": \"manual_only\""));

    let events = events.lock();
    assert!(events.iter().any(|e| matches!(e, EngineEvent::PlanReady { tasks: 1, manual: 1, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::TaskFinished { status: TaskStatus::Committed, .. })));
    assert!(matches!(events.last(), Some(EngineEvent::Completed { fixed: 1, .. })));
}

#[tokio::test]
async fn test_disabled_analyzer_and_analysis_only_report() {
    let repo = repo_with(&[("index.html", "<img src=\"a.png\">\n")]);
    let mut config = EngineConfig::default();
    config.analysis.disabled.insert("security".to_string());

    let analyzed = Engine::builder(repo.path())
        .analyzer(Arc::new(StaticAnalyzer {
            name: "performance",
            issues: vec![lazy_issue("index.html", 1)],
        }))
        .analyzer(Arc::new(StaticAnalyzer {
            name: "security",
            issues: vec![Issue::new("hardcoded_secret", Severity::Critical, "security", "key")],
        }))
        .validator(ScriptedValidator::passing())
        .config(config)
        .build()
        .unwrap()
        .without_baseline()
        .analyze()
        .await
        .unwrap();

    assert_eq!(analyzed.store().len(), 1);
    let report = analyzed.report();
    assert_eq!(report.count(Disposition::Open), 1);
    assert!(report.tasks.is_empty());
}

#[test]
fn test_builder_rejects_invalid_setup() {
    let repo = TempDir::new().unwrap();
    assert!(matches!(
        Engine::builder(repo.path()).build(),
        Err(CoreError::InvalidConfiguration(_))
    ));
    assert!(Engine::builder(repo.path().join("missing"))
        .validator(ScriptedValidator::passing())
        .build()
        .is_err());
}
