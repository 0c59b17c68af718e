//! Code quality and test quality analyzers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use tracing::info;

use remedy_core::{AnalysisResult, Analyzer, AnalyzerMetrics, CoreResult, FixDescriptor, Issue, Severity};

use crate::error::AgentResult;
use crate::scan::{self, SourceFile, SCRIPT_EXTENSIONS};

const CODE_QUALITY: &str = "code-quality";
const TEST_QUALITY: &str = "test-quality";

/// Debug leftovers in production sources.
#[derive(Debug, Clone)]
pub struct CodeQualityAnalyzer {
    console: Regex,
    todo: Regex,
}

impl CodeQualityAnalyzer {
    pub fn new() -> AgentResult<Self> {
        Ok(Self {
            // A whole-line statement is safe to delete; anything else is reported only.
            console: Regex::new(r"^console\.(?:log|debug|trace)\(.*\);?$")?,
            todo: Regex::new(r"(?://|/\*|\*)\s*(?:TODO|FIXME|HACK)\b")?,
        })
    }

    fn scan(&self, root: &Path) -> AnalysisResult {
        let mut issues = Vec::new();
        let mut files_scanned = 0;
        let mut todos = 0u64;

        match scan::source_files(root, SCRIPT_EXTENSIONS) {
            Ok(files) => {
                let files: Vec<&SourceFile> = files.iter().filter(|f| !scan::is_test_file(&f.relative)).collect();
                files_scanned = files.len();
                for file in files {
                    for (line_no, line) in file.numbered_lines() {
                        if self.todo.is_match(line) {
                            todos += 1;
                        }
                        if let Some(issue) = self.check_line(file, line_no, line.trim()) {
                            issues.push(issue);
                        }
                    }
                }
            }
            Err(e) => scan::gather(CODE_QUALITY, "sources", Err(e), &mut issues),
        }

        info!("🧹 Code quality scan: {} issue(s), {} TODO comment(s)", issues.len(), todos);
        AnalysisResult::new(CODE_QUALITY).with_issues(issues).with_metrics(
            AnalyzerMetrics::default()
                .with_files(files_scanned)
                .with_counter("todo_comments", todos),
        )
    }

    fn check_line(&self, file: &SourceFile, line_no: u32, trimmed: &str) -> Option<Issue> {
        let removable = |issue_type: &str, severity, message: &str, fixable: bool| {
            let issue = Issue::new(issue_type, severity, CODE_QUALITY, message)
                .at_file(&file.relative)
                .at_line(line_no);
            if fixable {
                issue.with_fix(FixDescriptor::RemoveLine {
                    file: PathBuf::from(&file.relative),
                    line: line_no,
                    expected: trimmed.to_string(),
                })
            } else {
                issue
            }
        };

        if trimmed == "debugger" || trimmed == "debugger;" {
            return Some(
                removable("debugger_statement", Severity::Medium, "debugger statement left in code", true)
                    .with_recommendation("Remove the debugger statement"),
            );
        }
        if trimmed.starts_with("console.log(") || trimmed.starts_with("console.debug(") || trimmed.starts_with("console.trace(") {
            let fixable = self.console.is_match(trimmed) && balanced(trimmed);
            return Some(
                removable("console_log_statement", Severity::Low, "Console logging left in code", fixable)
                    .with_recommendation("Remove the statement or route it through the application logger"),
            );
        }
        None
    }
}

/// Parentheses balance, so the statement ends on this line.
fn balanced(line: &str) -> bool {
    let mut depth = 0i32;
    for c in line.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

#[async_trait]
impl Analyzer for CodeQualityAnalyzer {
    fn name(&self) -> &str {
        CODE_QUALITY
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["debug-statements", "todo-comments"]
    }

    async fn analyze(&self, root: &Path) -> CoreResult<AnalysisResult> {
        let this = self.clone();
        scan::blocking(CODE_QUALITY, root, move |root| this.scan(root)).await
    }
}

/// Focused and skipped tests, and sources without any tests.
#[derive(Debug, Clone)]
pub struct TestQualityAnalyzer {
    focused: Regex,
    skipped: Regex,
}

impl TestQualityAnalyzer {
    pub fn new() -> AgentResult<Self> {
        Ok(Self {
            focused: Regex::new(r"\b(it|test|describe)\.only\(")?,
            skipped: Regex::new(r"\b(?:(?:it|test|describe)\.skip|xit|xdescribe)\(")?,
        })
    }

    fn scan(&self, root: &Path) -> AnalysisResult {
        let mut issues = Vec::new();
        let mut test_files = 0usize;

        match scan::source_files(root, SCRIPT_EXTENSIONS) {
            Ok(files) => {
                let (tests, sources): (Vec<&SourceFile>, Vec<&SourceFile>) =
                    files.iter().partition(|f| scan::is_test_file(&f.relative));
                test_files = tests.len();
                for file in &tests {
                    issues.extend(self.check_test_file(file));
                }
                if tests.is_empty() && !sources.is_empty() {
                    issues.push(
                        Issue::new(
                            "missing_tests",
                            Severity::Medium,
                            TEST_QUALITY,
                            format!("{} source file(s) and no tests", sources.len()),
                        )
                        .with_recommendation("Add tests for the critical paths before changing them"),
                    );
                }
            }
            Err(e) => scan::gather(TEST_QUALITY, "sources", Err(e), &mut issues),
        }

        info!("🧪 Test quality scan: {} issue(s) in {} test file(s)", issues.len(), test_files);
        AnalysisResult::new(TEST_QUALITY)
            .with_issues(issues)
            .with_metrics(AnalyzerMetrics::default().with_files(test_files).with_counter("test_files", test_files as u64))
    }

    fn check_test_file(&self, file: &SourceFile) -> Vec<Issue> {
        let mut issues = Vec::new();
        for (line_no, line) in file.numbered_lines() {
            if let Some(caps) = self.focused.captures(line) {
                let call = &caps[1];
                issues.push(
                    Issue::new("focused_test", Severity::High, TEST_QUALITY, format!("{}.only disables the rest of the suite", call))
                        .at_file(&file.relative)
                        .at_line(line_no)
                        .with_recommendation("Remove .only so every test runs")
                        .with_fix(FixDescriptor::ReplaceText {
                            file: PathBuf::from(&file.relative),
                            line: Some(line_no),
                            find: format!("{}.only(", call),
                            replace: format!("{}(", call),
                        }),
                );
            } else if self.skipped.is_match(line) {
                issues.push(
                    Issue::new("skipped_test", Severity::Low, TEST_QUALITY, "Test is skipped")
                        .at_file(&file.relative)
                        .at_line(line_no)
                        .with_recommendation("Fix or delete the skipped test"),
                );
            }
        }
        issues
    }
}

#[async_trait]
impl Analyzer for TestQualityAnalyzer {
    fn name(&self) -> &str {
        TEST_QUALITY
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["focused-tests", "skipped-tests", "test-presence"]
    }

    async fn analyze(&self, root: &Path) -> CoreResult<AnalysisResult> {
        let this = self.clone();
        scan::blocking(TEST_QUALITY, root, move |root| this.scan(root)).await
    }
}
