//! Mock diagnostic provider for testing.
//!
//! Returns scripted reports so validation behavior can be exercised
//! without running real tools.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use remedy_core::{CheckKind, Issue};

use crate::error::{PolicyError, PolicyResult};
use crate::provider::{DiagnosticProvider, DiagnosticReport};

/// Scripted response for one provider run.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub passed: bool,
    pub detail: String,
    pub diagnostics: Vec<Issue>,
    /// Returned as a provider error instead of a report.
    pub error: Option<String>,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn pass() -> Self {
        Self {
            passed: true,
            detail: "ok".to_string(),
            diagnostics: Vec::new(),
            error: None,
            delay: None,
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
            ..Self::pass()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::pass()
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Issue>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Mock provider that records calls and replays responses in order.
///
/// The last response repeats once the script is exhausted. Without any
/// response the provider passes with no diagnostics.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    kind: CheckKind,
    responses: Arc<RwLock<Vec<MockResponse>>>,
    response_index: Arc<AtomicUsize>,
    calls: Arc<RwLock<Vec<PathBuf>>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            name: name.into(),
            kind,
            responses: Arc::new(RwLock::new(Vec::new())),
            response_index: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    /// Roots the provider was run against.
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.read().clone()
    }

    fn next_response(&self) -> MockResponse {
        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::pass();
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index.min(responses.len() - 1))
            .cloned()
            .unwrap_or_else(MockResponse::pass)
    }
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl DiagnosticProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CheckKind {
        self.kind
    }

    async fn run(&self, root: &Path) -> PolicyResult<DiagnosticReport> {
        self.calls.write().push(root.to_path_buf());
        let response = self.next_response();

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = response.error {
            return Err(PolicyError::ProviderFailed {
                provider: self.name.clone(),
                message,
            });
        }
        Ok(DiagnosticReport {
            passed: response.passed,
            detail: response.detail,
            diagnostics: response.diagnostics,
        })
    }
}
