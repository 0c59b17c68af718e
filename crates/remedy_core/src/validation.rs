//! Validation contract, results and the diagnostics baseline.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::issue::{Issue, IssueKey};

/// Check categories, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    TypeCheck,
    Build,
    Test,
    Lint,
    Custom,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::TypeCheck => "type_check",
            CheckKind::Build => "build",
            CheckKind::Test => "test",
            CheckKind::Lint => "lint",
            CheckKind::Custom => "custom",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one validation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub kind: CheckKind,
    pub passed: bool,
    pub detail: String,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub duration_ms: u64,
    /// Structured diagnostics produced by the check.
    #[serde(default)]
    pub diagnostics: Vec<Issue>,
}

impl CheckOutcome {
    pub fn passed(name: impl Into<String>, kind: CheckKind, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            passed: true,
            detail: detail.into(),
            skipped: false,
            timed_out: false,
            duration_ms: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn failed(name: impl Into<String>, kind: CheckKind, detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            ..Self::passed(name, kind, detail)
        }
    }

    /// Skipped after an earlier failure. Counts as not passed.
    pub fn skipped(name: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            skipped: true,
            ..Self::failed(name, kind, "skipped after earlier failure")
        }
    }

    pub fn timed_out(name: impl Into<String>, kind: CheckKind, limit: Duration) -> Self {
        Self {
            timed_out: true,
            duration_ms: limit.as_millis() as u64,
            ..Self::failed(name, kind, format!("timed out after {:?}", limit))
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Issue>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}

/// How strictly a validation pass is judged against the baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationPolicy {
    /// Tolerate a failing check that already failed at baseline.
    pub allow_preexisting_failures: bool,
    /// Treat a baseline diagnostic that only moved to another line as known.
    pub tolerate_line_shifts: bool,
}

/// Result of a full validation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub checks: Vec<CheckOutcome>,
    /// Diagnostics absent from the baseline.
    pub regressions: Vec<Issue>,
}

impl ValidationResult {
    /// Derive pass/fail and regressions for `checks` against `baseline`.
    ///
    /// Skipped checks never count as passing. Any regression fails the
    /// result on its own.
    pub fn evaluate(checks: Vec<CheckOutcome>, baseline: &Baseline, policy: EvaluationPolicy) -> Self {
        let regressions: Vec<Issue> = checks
            .iter()
            .flat_map(|c| c.diagnostics.iter())
            .filter(|d| baseline.is_regression(d))
            .filter(|d| !(policy.tolerate_line_shifts && baseline.is_shifted(d)))
            .cloned()
            .collect();

        let checks_ok = checks.iter().all(|c| {
            c.passed
                || (policy.allow_preexisting_failures
                    && !c.skipped
                    && baseline.failing_checks.contains(&c.name))
        });

        Self {
            passed: checks_ok && regressions.is_empty(),
            checks,
            regressions,
        }
    }

    /// Result for a validator that could not run at all.
    pub fn errored(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            checks: vec![CheckOutcome::failed("validator", CheckKind::Custom, detail)],
            regressions: Vec::new(),
        }
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed && !c.skipped)
    }

    /// One-line reason for a failed validation.
    pub fn summary(&self) -> String {
        if self.passed {
            return format!("{} checks passed", self.checks.len());
        }
        let mut parts: Vec<String> = self
            .failed_checks()
            .map(|c| format!("{} failed: {}", c.name, c.detail))
            .collect();
        if !self.regressions.is_empty() {
            let ids: Vec<&str> = self.regressions.iter().map(|r| r.id.as_str()).collect();
            parts.push(format!("{} new diagnostic(s): {}", ids.len(), ids.join(", ")));
        }
        if parts.is_empty() {
            parts.push("validation did not pass".to_string());
        }
        parts.join("; ")
    }
}

/// Diagnostics and failing checks of the last known-good state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Baseline {
    pub diagnostics: BTreeSet<IssueKey>,
    /// `(type, file, message)` of every baseline diagnostic.
    #[serde(default)]
    pub signatures: BTreeSet<(String, Option<String>, String)>,
    /// Checks that ran and failed. Only these may be tolerated later.
    pub failing_checks: BTreeSet<String>,
    /// Checks skipped by fail-fast, whose state is unknown.
    #[serde(default)]
    pub unchecked: BTreeSet<String>,
    /// False when validation was skipped and everything counts as new.
    pub established: bool,
}

impl Baseline {
    /// Baseline with nothing recorded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_result(result: &ValidationResult) -> Self {
        let diagnostics: Vec<&Issue> = result.checks.iter().flat_map(|c| c.diagnostics.iter()).collect();
        Self {
            diagnostics: diagnostics.iter().map(|d| d.key()).collect(),
            signatures: diagnostics.iter().map(|d| signature(d)).collect(),
            failing_checks: result
                .checks
                .iter()
                .filter(|c| !c.passed && !c.skipped)
                .map(|c| c.name.clone())
                .collect(),
            unchecked: result
                .checks
                .iter()
                .filter(|c| c.skipped)
                .map(|c| c.name.clone())
                .collect(),
            established: true,
        }
    }

    /// A diagnostic is new when its identity key was absent at baseline.
    pub fn is_regression(&self, diagnostic: &Issue) -> bool {
        !self.diagnostics.contains(&diagnostic.key())
    }

    /// Same type, file and message as a baseline diagnostic, on any line.
    pub fn is_shifted(&self, diagnostic: &Issue) -> bool {
        self.signatures.contains(&signature(diagnostic))
    }
}

fn signature(issue: &Issue) -> (String, Option<String>, String) {
    (
        issue.issue_type.clone(),
        issue.file.as_ref().map(|f| f.to_string_lossy().replace('\\', "/")),
        issue.message.clone(),
    )
}

/// Runs the validation battery against the repository.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, root: &Path, baseline: &Baseline) -> CoreResult<ValidationResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::Severity;

    fn diagnostic(line: u32, message: &str) -> Issue {
        Issue::new("TS2322", Severity::Critical, "validation:typecheck", message)
            .at_file("src/a.ts")
            .at_line(line)
    }

    #[test]
    fn test_new_diagnostic_is_regression_even_when_checks_pass() {
        let baseline = Baseline::from_result(&ValidationResult::evaluate(
            vec![CheckOutcome::passed("typecheck", CheckKind::TypeCheck, "ok")],
            &Baseline::empty(),
            EvaluationPolicy::default(),
        ));

        let checks = vec![CheckOutcome::passed("typecheck", CheckKind::TypeCheck, "ok")
            .with_diagnostics(vec![diagnostic(3, "Type 'string' is not assignable")])];
        let result = ValidationResult::evaluate(checks, &baseline, EvaluationPolicy::default());
        assert!(!result.passed);
        assert_eq!(result.regressions.len(), 1);
        assert!(result.summary().contains("new diagnostic"));
    }

    #[test]
    fn test_line_shift_tolerance() {
        let before = ValidationResult::evaluate(
            vec![CheckOutcome::failed("typecheck", CheckKind::TypeCheck, "1 error")
                .with_diagnostics(vec![diagnostic(10, "old error")])],
            &Baseline::empty(),
            EvaluationPolicy::default(),
        );
        let baseline = Baseline::from_result(&before);
        assert!(baseline.failing_checks.contains("typecheck"));
        assert!(!baseline.is_regression(&diagnostic(10, "old error")));
        assert!(baseline.is_regression(&diagnostic(9, "old error")));
        assert!(baseline.is_shifted(&diagnostic(9, "old error")));

        let shifted = || {
            vec![CheckOutcome::passed("typecheck", CheckKind::TypeCheck, "ok")
                .with_diagnostics(vec![diagnostic(9, "old error")])]
        };
        let strict = ValidationResult::evaluate(shifted(), &baseline, EvaluationPolicy::default());
        assert_eq!(strict.regressions.len(), 1);

        let lenient = EvaluationPolicy {
            tolerate_line_shifts: true,
            ..EvaluationPolicy::default()
        };
        assert!(ValidationResult::evaluate(shifted(), &baseline, lenient).passed);
    }

    #[test]
    fn test_preexisting_failures() {
        let baseline = Baseline {
            failing_checks: BTreeSet::from(["lint".to_string()]),
            established: true,
            ..Baseline::default()
        };
        let checks = || {
            vec![
                CheckOutcome::passed("build", CheckKind::Build, "ok"),
                CheckOutcome::failed("lint", CheckKind::Lint, "3 warnings"),
            ]
        };
        let allow = EvaluationPolicy {
            allow_preexisting_failures: true,
            ..EvaluationPolicy::default()
        };
        assert!(!ValidationResult::evaluate(checks(), &baseline, EvaluationPolicy::default()).passed);
        assert!(ValidationResult::evaluate(checks(), &baseline, allow).passed);

        let skipped = vec![CheckOutcome::skipped("lint", CheckKind::Lint)];
        assert!(!ValidationResult::evaluate(skipped, &baseline, allow).passed);
    }

    #[test]
    fn test_skipped_checks_are_never_tolerated() {
        let at_baseline = ValidationResult::evaluate(
            vec![
                CheckOutcome::failed("typecheck", CheckKind::TypeCheck, "1 error"),
                CheckOutcome::skipped("build", CheckKind::Build),
            ],
            &Baseline::empty(),
            EvaluationPolicy::default(),
        );
        let baseline = Baseline::from_result(&at_baseline);
        assert_eq!(baseline.failing_checks, BTreeSet::from(["typecheck".to_string()]));
        assert_eq!(baseline.unchecked, BTreeSet::from(["build".to_string()]));

        let allow = EvaluationPolicy {
            allow_preexisting_failures: true,
            ..EvaluationPolicy::default()
        };
        let after_fix = ValidationResult::evaluate(
            vec![
                CheckOutcome::failed("typecheck", CheckKind::TypeCheck, "1 error"),
                CheckOutcome::failed("build", CheckKind::Build, "bundle broken"),
            ],
            &baseline,
            allow,
        );
        assert!(!after_fix.passed);
        assert_eq!(after_fix.failed_checks().count(), 2);
    }

    #[test]
    fn test_check_kind_order() {
        let mut kinds = vec![CheckKind::Lint, CheckKind::Custom, CheckKind::TypeCheck, CheckKind::Test, CheckKind::Build];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![CheckKind::TypeCheck, CheckKind::Build, CheckKind::Test, CheckKind::Lint, CheckKind::Custom]
        );
    }
}
