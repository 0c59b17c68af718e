//! Ordered, timeout-bounded validation battery.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use remedy_core::{
    Baseline, CheckOutcome, CoreResult, EvaluationPolicy, ValidationResult, Validator,
};

use crate::provider::DiagnosticProvider;

/// A provider with its time limit.
#[derive(Clone)]
pub struct PipelineCheck {
    provider: Arc<dyn DiagnosticProvider>,
    timeout: Duration,
}

impl PipelineCheck {
    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn provider(&self) -> &Arc<dyn DiagnosticProvider> {
        &self.provider
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for PipelineCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCheck")
            .field("name", &self.provider.name())
            .field("kind", &self.provider.kind())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runs checks in kind order (type check, build, test, lint, custom).
///
/// A timeout or provider error counts as a failed check. With fail-fast on,
/// the checks after the first failure are reported as skipped.
#[derive(Debug, Clone)]
pub struct ValidationPipeline {
    checks: Vec<PipelineCheck>,
    fail_fast: bool,
    policy: EvaluationPolicy,
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationPipeline {
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            fail_fast: true,
            policy: EvaluationPolicy::default(),
        }
    }

    /// Add a check. Checks of the same kind keep their insertion order.
    pub fn with_check(mut self, provider: Arc<dyn DiagnosticProvider>, timeout: Duration) -> Self {
        self.add_check(provider, timeout);
        self
    }

    pub fn add_check(&mut self, provider: Arc<dyn DiagnosticProvider>, timeout: Duration) {
        let kind = provider.kind();
        let position = self
            .checks
            .iter()
            .position(|c| c.provider.kind() > kind)
            .unwrap_or(self.checks.len());
        self.checks.insert(position, PipelineCheck { provider, timeout });
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn allow_preexisting_failures(mut self, allow: bool) -> Self {
        self.policy.allow_preexisting_failures = allow;
        self
    }

    pub fn tolerate_line_shifts(mut self, tolerate: bool) -> Self {
        self.policy.tolerate_line_shifts = tolerate;
        self
    }

    pub fn checks(&self) -> &[PipelineCheck] {
        &self.checks
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every check against `root` and judge the result against `baseline`.
    pub async fn run(&self, root: &Path, baseline: &Baseline) -> ValidationResult {
        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(self.checks.len());
        let mut failed = false;
        // Tolerance needs every check's baseline state, so the baseline pass runs them all.
        let fail_fast = self.fail_fast && !(self.policy.allow_preexisting_failures && !baseline.established);

        for check in &self.checks {
            let name = check.provider.name();
            let kind = check.provider.kind();

            if failed && fail_fast {
                debug!("Skipping {} after earlier failure", name);
                outcomes.push(CheckOutcome::skipped(name, kind));
                continue;
            }

            let check_started = Instant::now();
            let outcome = match tokio::time::timeout(check.timeout, check.provider.run(root)).await {
                Ok(Ok(report)) => {
                    let outcome = if report.passed {
                        CheckOutcome::passed(name, kind, report.detail)
                    } else {
                        CheckOutcome::failed(name, kind, report.detail)
                    };
                    outcome
                        .with_diagnostics(report.diagnostics)
                        .with_duration(check_started.elapsed())
                }
                Ok(Err(e)) => {
                    warn!("Check {} errored: {}", name, e);
                    CheckOutcome::failed(name, kind, e.to_string()).with_duration(check_started.elapsed())
                }
                Err(_) => {
                    warn!("Check {} timed out after {:?}", name, check.timeout);
                    CheckOutcome::timed_out(name, kind, check.timeout)
                }
            };

            debug!(
                "Check {} {} ({}ms)",
                name,
                if outcome.passed { "passed" } else { "failed" },
                outcome.duration_ms
            );
            // A check already failing at baseline does not trip fail-fast when tolerated.
            let tolerated = self.policy.allow_preexisting_failures
                && baseline.failing_checks.contains(&outcome.name);
            failed |= !outcome.passed && !tolerated;
            outcomes.push(outcome);
        }

        let result = ValidationResult::evaluate(outcomes, baseline, self.policy);
        info!(
            "Validation {} in {}ms: {}",
            if result.passed { "passed" } else { "failed" },
            started.elapsed().as_millis(),
            result.summary()
        );
        result
    }
}

#[async_trait]
impl Validator for ValidationPipeline {
    async fn validate(&self, root: &Path, baseline: &Baseline) -> CoreResult<ValidationResult> {
        Ok(self.run(root, baseline).await)
    }
}
