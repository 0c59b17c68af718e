//! Built-in analyzer kinds and the default analyzer and fix registries.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use remedy_core::{Analyzer, FixRegistry};
use remedy_policy::DiagnosticProvider;

use crate::a11y::A11yAnalyzer;
use crate::dependency::DependencyAnalyzer;
use crate::deployment::DeploymentAnalyzer;
use crate::diagnostics::TypeDiagnosticsAnalyzer;
use crate::error::{AgentError, AgentResult};
use crate::fixes::{InsertAttributeFix, PinDependencyFix, RemoveLineFix, ReplaceTextFix};
use crate::performance::PerformanceAnalyzer;
use crate::quality::{CodeQualityAnalyzer, TestQualityAnalyzer};
use crate::security::SecurityAnalyzer;

/// Built-in analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalyzerKind {
    Security,
    Performance,
    Accessibility,
    Dependency,
    TestQuality,
    CodeQuality,
    Deployment,
    Types,
}

impl AnalyzerKind {
    /// Name the analyzer reports as `source_analyzer`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerKind::Security => "security",
            AnalyzerKind::Performance => "performance",
            AnalyzerKind::Accessibility => "accessibility",
            AnalyzerKind::Dependency => "dependency",
            AnalyzerKind::TestQuality => "test-quality",
            AnalyzerKind::CodeQuality => "code-quality",
            AnalyzerKind::Deployment => "deployment",
            AnalyzerKind::Types => "types",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AnalyzerKind::Security => "Hardcoded secrets and code injection",
            AnalyzerKind::Performance => "Image loading and asset size",
            AnalyzerKind::Accessibility => "Alternative text and document language",
            AnalyzerKind::Dependency => "Version pinning and lockfiles",
            AnalyzerKind::TestQuality => "Focused, skipped and missing tests",
            AnalyzerKind::CodeQuality => "Debug statements left in sources",
            AnalyzerKind::Deployment => "Base images and environment files",
            AnalyzerKind::Types => "Compiler diagnostics",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            AnalyzerKind::Security,
            AnalyzerKind::Performance,
            AnalyzerKind::Accessibility,
            AnalyzerKind::Dependency,
            AnalyzerKind::TestQuality,
            AnalyzerKind::CodeQuality,
            AnalyzerKind::Deployment,
            AnalyzerKind::Types,
        ]
    }

    /// Instantiate the analyzer.
    ///
    /// `Types` needs a diagnostic provider and yields `None` without one.
    pub fn build(&self, provider: Option<&Arc<dyn DiagnosticProvider>>) -> AgentResult<Option<Arc<dyn Analyzer>>> {
        let analyzer: Arc<dyn Analyzer> = match self {
            AnalyzerKind::Security => Arc::new(SecurityAnalyzer::new()?),
            AnalyzerKind::Performance => Arc::new(PerformanceAnalyzer::new()),
            AnalyzerKind::Accessibility => Arc::new(A11yAnalyzer::new()),
            AnalyzerKind::Dependency => Arc::new(DependencyAnalyzer::new()),
            AnalyzerKind::TestQuality => Arc::new(TestQualityAnalyzer::new()?),
            AnalyzerKind::CodeQuality => Arc::new(CodeQualityAnalyzer::new()?),
            AnalyzerKind::Deployment => Arc::new(DeploymentAnalyzer::new()),
            AnalyzerKind::Types => match provider {
                Some(provider) => Arc::new(TypeDiagnosticsAnalyzer::new(Arc::clone(provider))),
                None => return Ok(None),
            },
        };
        Ok(Some(analyzer))
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnalyzerKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalyzerKind::all()
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AgentError::parse("analyzers", format!("unknown analyzer: {}", s)))
    }
}

/// Every built-in analyzer, with type diagnostics when a provider is given.
pub fn default_analyzers(provider: Option<Arc<dyn DiagnosticProvider>>) -> AgentResult<Vec<Arc<dyn Analyzer>>> {
    let mut analyzers = Vec::new();
    for kind in AnalyzerKind::all() {
        if let Some(analyzer) = kind.build(provider.as_ref())? {
            analyzers.push(analyzer);
        }
    }
    Ok(analyzers)
}

/// Handlers for every auto-fixable issue type the built-in analyzers emit.
pub fn default_fix_registry() -> FixRegistry {
    let insert = Arc::new(InsertAttributeFix);
    let remove = Arc::new(RemoveLineFix);
    FixRegistry::new()
        .with("missing_lazy_loading", insert.clone())
        .with("missing_alt_text", insert.clone())
        .with("missing_document_language", insert)
        .with("console_log_statement", remove.clone())
        .with("debugger_statement", remove)
        .with("focused_test", Arc::new(ReplaceTextFix))
        .with("unpinned_dependency", Arc::new(PinDependencyFix))
}
