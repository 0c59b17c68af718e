//! Accessibility analyzer.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use remedy_core::{AnalysisResult, Analyzer, AnalyzerMetrics, CoreResult, FixDescriptor, Issue, Severity};

use crate::scan::{self, SourceFile, MARKUP_EXTENSIONS};

const NAME: &str = "accessibility";

/// Checks images for alternative text and documents for a language.
#[derive(Debug, Clone)]
pub struct A11yAnalyzer {
    default_language: String,
}

impl Default for A11yAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl A11yAnalyzer {
    pub fn new() -> Self {
        Self {
            default_language: "en".to_string(),
        }
    }

    /// Language inserted by the `missing_document_language` fix.
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    fn scan(&self, root: &Path) -> AnalysisResult {
        let mut issues = Vec::new();
        let mut files_scanned = 0;

        match scan::source_files(root, MARKUP_EXTENSIONS) {
            Ok(files) => {
                files_scanned = files.len();
                for file in &files {
                    issues.extend(missing_alt_text(file));
                    if matches!(file.extension(), "html" | "htm") {
                        issues.extend(self.missing_language(file));
                    }
                }
            }
            Err(e) => scan::gather(NAME, "markup", Err(e), &mut issues),
        }

        info!("♿ Accessibility scan: {} issue(s)", issues.len());
        AnalysisResult::new(NAME)
            .with_issues(issues)
            .with_metrics(AnalyzerMetrics::default().with_files(files_scanned))
    }

    fn missing_language(&self, file: &SourceFile) -> Option<Issue> {
        let tag = scan::find_tags(&file.content, "html").into_iter().next()?;
        if tag.has_attribute("lang") {
            return None;
        }
        Some(
            Issue::new(
                "missing_document_language",
                Severity::Medium,
                NAME,
                "Document does not declare a language",
            )
            .at_file(&file.relative)
            .at_line(tag.line)
            .with_recommendation("Set the lang attribute on <html> so screen readers pick the right voice")
            .with_fix(FixDescriptor::InsertAttribute {
                file: PathBuf::from(&file.relative),
                line: tag.line,
                element: "html".to_string(),
                attribute: "lang".to_string(),
                value: self.default_language.clone(),
            }),
        )
    }
}

fn missing_alt_text(file: &SourceFile) -> Vec<Issue> {
    let lines: BTreeSet<u32> = scan::find_tags(&file.content, "img")
        .into_iter()
        .filter(|tag| !tag.has_attribute("alt"))
        .map(|tag| tag.line)
        .collect();

    // An empty alt marks the image decorative; whether that is right needs a human look.
    lines
        .into_iter()
        .map(|line| {
            Issue::new("missing_alt_text", Severity::High, NAME, "Image has no alternative text")
                .at_file(&file.relative)
                .at_line(line)
                .with_recommendation("Describe the image in alt, or use alt=\"\" if it is decorative")
                .heuristic()
                .with_fix(FixDescriptor::InsertAttribute {
                    file: PathBuf::from(&file.relative),
                    line,
                    element: "img".to_string(),
                    attribute: "alt".to_string(),
                    value: String::new(),
                })
        })
        .collect()
}

#[async_trait]
impl Analyzer for A11yAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["alt-text", "document-language"]
    }

    async fn analyze(&self, root: &Path) -> CoreResult<AnalysisResult> {
        let this = self.clone();
        scan::blocking(NAME, root, move |root| this.scan(root)).await
    }
}
