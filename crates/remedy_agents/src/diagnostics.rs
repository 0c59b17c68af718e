//! Type diagnostics analyzer, backed by a diagnostic provider.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use remedy_core::{AnalysisResult, Analyzer, AnalyzerMetrics, CoreResult, Issue};
use remedy_policy::DiagnosticProvider;

const NAME: &str = "types";

/// Reports the compiler's diagnostics as issues.
///
/// The provider is usually the same one the validation pipeline runs for its
/// type check, so analysis and validation agree on what a diagnostic is.
pub struct TypeDiagnosticsAnalyzer {
    provider: Arc<dyn DiagnosticProvider>,
}

impl TypeDiagnosticsAnalyzer {
    pub fn new(provider: Arc<dyn DiagnosticProvider>) -> Self {
        Self { provider }
    }
}

impl std::fmt::Debug for TypeDiagnosticsAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDiagnosticsAnalyzer")
            .field("provider", &self.provider.name())
            .finish()
    }
}

#[async_trait]
impl Analyzer for TypeDiagnosticsAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["type-check"]
    }

    async fn analyze(&self, root: &Path) -> CoreResult<AnalysisResult> {
        let report = self.provider.run(root).await?;

        let mut issues: Vec<Issue> = report
            .diagnostics
            .into_iter()
            .map(|mut issue| {
                issue.source_analyzer = NAME.to_string();
                issue.with_tag("types")
            })
            .collect();

        // A failing run that produced nothing parseable tells us nothing.
        if !report.passed && issues.is_empty() {
            issues.push(Issue::analysis_incomplete(
                NAME,
                format!("{} failed without diagnostics: {}", self.provider.name(), report.detail),
            ));
        }

        info!("🔎 Type diagnostics: {} issue(s) from {}", issues.len(), self.provider.name());
        let count = issues.len();
        Ok(AnalysisResult::new(NAME)
            .with_issues(issues)
            .with_metrics(AnalyzerMetrics::default().with_counter("diagnostics", count as u64)))
    }
}
