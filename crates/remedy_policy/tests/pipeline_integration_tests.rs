//! Engine runs validated by a real pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use remedy_core::{
    AnalysisResult, Analyzer, CheckKind, CoreResult, Disposition, Engine, FixDescriptor, FixHandler,
    FixRegistry, FixWorkspace, Issue, Severity,
};
use remedy_policy::{MockProvider, MockResponse, PipelineConfig, ValidationPipeline};

struct OneIssue(Issue);

#[async_trait]
impl Analyzer for OneIssue {
    fn name(&self) -> &str {
        "code-quality"
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["javascript"]
    }

    async fn analyze(&self, _root: &Path) -> CoreResult<AnalysisResult> {
        Ok(AnalysisResult::new("code-quality").with_issue(self.0.clone()))
    }
}

struct DropLine;

#[async_trait]
impl FixHandler for DropLine {
    fn name(&self) -> &str {
        "drop-line"
    }

    async fn apply(&self, _: &Issue, fix: &FixDescriptor, ws: &mut FixWorkspace) -> CoreResult<()> {
        if let FixDescriptor::RemoveLine { file, line, .. } = fix {
            let content = ws.read_to_string(file)?;
            let kept: Vec<&str> = content
                .lines()
                .enumerate()
                .filter(|(i, _)| *i as u32 + 1 != *line)
                .map(|(_, l)| l)
                .collect();
            ws.write(file, format!("{}\n", kept.join("\n")))?;
        }
        Ok(())
    }
}

fn console_issue() -> Issue {
    Issue::new("console_log_statement", Severity::Low, "code-quality", "console.log left in code")
        .at_file("app.js")
        .at_line(2)
        .with_fix(FixDescriptor::RemoveLine {
            file: PathBuf::from("app.js"),
            line: 2,
            expected: "console.log(total);".to_string(),
        })
}

fn repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("app.js"),
        "const total = 1;\nconsole.log(total);\nexport default total;\n",
    )
    .unwrap();
    dir
}

#[tokio::test]
async fn test_new_type_diagnostic_rolls_back_fix() {
    let repo = repo();
    let original = fs::read(repo.path().join("app.js")).unwrap();

    let regression = Issue::new("type_error:TS2304", Severity::High, "validation:typecheck", "Cannot find name 'total'")
        .at_file("app.js")
        .at_line(2);
    let typecheck = MockProvider::new("typecheck", CheckKind::TypeCheck).with_responses(vec![
        MockResponse::pass(),
        MockResponse::pass().with_diagnostics(vec![regression]),
    ]);
    let pipeline = ValidationPipeline::new().with_check(Arc::new(typecheck.clone()), Duration::from_secs(5));

    let complete = Engine::builder(repo.path())
        .analyzer(Arc::new(OneIssue(console_issue())))
        .fix_registry(FixRegistry::new().with("console_log_statement", Arc::new(DropLine)))
        .validator(Arc::new(pipeline))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = complete.report();
    assert_eq!(report.count(Disposition::RolledBack), 1);
    assert_eq!(typecheck.call_count(), 2);
    assert_eq!(fs::read(repo.path().join("app.js")).unwrap(), original);
}

#[tokio::test]
async fn test_passing_pipeline_commits_fix() {
    let repo = repo();
    let build = MockProvider::new("build", CheckKind::Build);
    let lint = MockProvider::new("lint", CheckKind::Lint);
    let pipeline = ValidationPipeline::new()
        .with_check(Arc::new(lint.clone()), Duration::from_secs(5))
        .with_check(Arc::new(build.clone()), Duration::from_secs(5));

    let complete = Engine::builder(repo.path())
        .analyzer(Arc::new(OneIssue(console_issue())))
        .fix_registry(FixRegistry::new().with("console_log_statement", Arc::new(DropLine)))
        .validator(Arc::new(pipeline))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(complete.report().count(Disposition::Fixed), 1);
    assert_eq!(build.call_count(), 2);
    assert_eq!(lint.call_count(), 2);
    let content = fs::read_to_string(repo.path().join("app.js")).unwrap();
    assert!(!content.contains("console.log"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_configured_shell_check_gates_fix() {
    let repo = repo();
    // Fails once the console statement is gone, so the fix must be rolled back.
    let yaml = r#"
checks:
  - name: guard
    kind: custom
    program: sh
    args: ["-c", "grep -q console.log app.js"]
    timeout_secs: 30
"#;
    let pipeline = PipelineConfig::from_yaml(yaml).unwrap().build(repo.path()).unwrap();

    let complete = Engine::builder(repo.path())
        .analyzer(Arc::new(OneIssue(console_issue())))
        .fix_registry(FixRegistry::new().with("console_log_statement", Arc::new(DropLine)))
        .validator(Arc::new(pipeline))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(complete.report().count(Disposition::RolledBack), 1);
    let content = fs::read_to_string(repo.path().join("app.js")).unwrap();
    assert!(content.contains("console.log(total);"));
}
