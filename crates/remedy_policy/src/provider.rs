//! Diagnostic provider contract.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use remedy_core::{CheckKind, Issue};

use crate::error::PolicyResult;

/// Structured outcome of one diagnostic run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub passed: bool,
    pub detail: String,
    #[serde(default)]
    pub diagnostics: Vec<Issue>,
}

impl DiagnosticReport {
    pub fn passed(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
            diagnostics: Vec::new(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Issue>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Computes one kind of diagnostic (type check, build, tests, lint, ...).
///
/// How the diagnostics are obtained is up to the implementation; the
/// pipeline only sees the structured report.
#[async_trait]
pub trait DiagnosticProvider: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> CheckKind;

    async fn run(&self, root: &Path) -> PolicyResult<DiagnosticReport>;
}
