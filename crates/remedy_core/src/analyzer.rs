//! Analyzer contract and the concurrent analysis phase.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CoreResult;
use crate::issue::Issue;

/// Summary metrics reported by one analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerMetrics {
    pub files_scanned: usize,
    pub duration_ms: u64,
    /// Analyzer-specific counters.
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
}

impl AnalyzerMetrics {
    pub fn with_files(mut self, files: usize) -> Self {
        self.files_scanned = files;
        self
    }

    pub fn with_counter(mut self, name: impl Into<String>, value: u64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }
}

/// Output of a single analyzer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analyzer: String,
    pub issues: Vec<Issue>,
    pub metrics: AnalyzerMetrics,
    /// Set when the analyzer failed as a whole.
    #[serde(default)]
    pub degraded: bool,
}

impl AnalysisResult {
    pub fn new(analyzer: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.into(),
            issues: Vec::new(),
            metrics: AnalyzerMetrics::default(),
            degraded: false,
        }
    }

    /// Result for an analyzer that failed, panicked or timed out.
    pub fn degraded(analyzer: impl Into<String>, detail: impl Into<String>) -> Self {
        let analyzer = analyzer.into();
        Self {
            issues: vec![Issue::analysis_incomplete(analyzer.clone(), detail)],
            analyzer,
            metrics: AnalyzerMetrics::default(),
            degraded: true,
        }
    }

    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn with_issues(mut self, issues: impl IntoIterator<Item = Issue>) -> Self {
        self.issues.extend(issues);
        self
    }

    pub fn with_metrics(mut self, metrics: AnalyzerMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

/// A read-only inspector of a repository.
///
/// Implementations must be safe to call concurrently and must not modify
/// anything under `root`. A failing sub-check should be reported as an
/// [`Issue::analysis_incomplete`] instead of an error.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Unique analyzer name, used as `source_analyzer`.
    fn name(&self) -> &str;

    /// Static capability labels, used for reporting and filtering.
    fn capabilities(&self) -> Vec<&'static str> {
        Vec::new()
    }

    async fn analyze(&self, root: &Path) -> CoreResult<AnalysisResult>;
}

/// Run every analyzer concurrently, each bounded by `limit`.
///
/// Results come back in the order of `analyzers`. A failing, panicking or
/// timed-out analyzer yields a degraded result and never affects its siblings.
pub async fn run_analyzers(
    analyzers: &[Arc<dyn Analyzer>],
    root: &Path,
    limit: Duration,
) -> Vec<AnalysisResult> {
    let handles: Vec<_> = analyzers
        .iter()
        .map(|analyzer| {
            let analyzer = Arc::clone(analyzer);
            let root = root.to_path_buf();
            let name = analyzer.name().to_string();
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let outcome = tokio::time::timeout(limit, analyzer.analyze(&root)).await;
                (outcome, started.elapsed())
            });
            (name, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let result = match handle.await {
            Ok((Ok(Ok(mut result)), elapsed)) => {
                if result.metrics.duration_ms == 0 {
                    result.metrics.duration_ms = elapsed.as_millis() as u64;
                }
                debug!("Analyzer {} reported {} issues", name, result.issues.len());
                result
            }
            Ok((Ok(Err(e)), _)) => {
                warn!("Analyzer {} failed: {}", name, e);
                AnalysisResult::degraded(&name, e.to_string())
            }
            Ok((Err(_), _)) => {
                warn!("Analyzer {} timed out after {:?}", name, limit);
                AnalysisResult::degraded(&name, format!("timed out after {:?}", limit))
            }
            Err(e) => {
                warn!("Analyzer {} aborted: {}", name, e);
                AnalysisResult::degraded(&name, format!("analyzer task aborted: {}", e))
            }
        };
        results.push(result);
    }
    results
}
