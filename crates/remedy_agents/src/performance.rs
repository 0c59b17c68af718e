//! Performance analyzer: image loading and asset weight.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use remedy_core::{AnalysisResult, Analyzer, AnalyzerMetrics, CoreResult, FixDescriptor, Issue, Severity};

use crate::error::AgentResult;
use crate::scan::{self, SourceFile, MARKUP_EXTENSIONS};

const NAME: &str = "performance";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff"];

/// Image assets above this size are reported.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 500 * 1024;

#[derive(Debug, Clone)]
pub struct PerformanceAnalyzer {
    max_image_bytes: u64,
}

impl Default for PerformanceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceAnalyzer {
    pub fn new() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_image_bytes(mut self, bytes: u64) -> Self {
        self.max_image_bytes = bytes;
        self
    }

    fn scan(&self, root: &Path) -> AnalysisResult {
        let mut issues = Vec::new();
        let mut files_scanned = 0;

        match scan::source_files(root, MARKUP_EXTENSIONS) {
            Ok(files) => {
                files_scanned = files.len();
                issues.extend(files.iter().flat_map(lazy_loading_issues));
            }
            Err(e) => scan::gather(NAME, "lazy-loading", Err(e), &mut issues),
        }
        scan::gather(NAME, "image-size", self.oversized_images(root), &mut issues);

        info!("⚡ Performance scan: {} issue(s)", issues.len());
        AnalysisResult::new(NAME)
            .with_issues(issues)
            .with_metrics(AnalyzerMetrics::default().with_files(files_scanned))
    }

    fn oversized_images(&self, root: &Path) -> AgentResult<Vec<Issue>> {
        let images = scan::walk_files(root, |path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })?;

        let mut issues = Vec::new();
        for image in images {
            let size = std::fs::metadata(root.join(&image))?.len();
            if size > self.max_image_bytes {
                issues.push(
                    Issue::new(
                        "oversized_image",
                        Severity::Medium,
                        NAME,
                        format!("Image is {} KB (limit {} KB)", size / 1024, self.max_image_bytes / 1024),
                    )
                    .at_file(image)
                    .with_recommendation("Compress the image or serve a modern format such as WebP or AVIF"),
                );
            }
        }
        Ok(issues)
    }
}

/// One issue per line holding an `<img>` without a `loading` attribute.
fn lazy_loading_issues(file: &SourceFile) -> Vec<Issue> {
    let lines: BTreeSet<u32> = scan::find_tags(&file.content, "img")
        .into_iter()
        .filter(|tag| !tag.has_attribute("loading"))
        .map(|tag| tag.line)
        .collect();

    lines
        .into_iter()
        .map(|line| {
            Issue::new("missing_lazy_loading", Severity::Low, NAME, "Image is not lazy-loaded")
                .at_file(&file.relative)
                .at_line(line)
                .with_recommendation("Add loading=\"lazy\" to images below the fold")
                .with_fix(FixDescriptor::InsertAttribute {
                    file: PathBuf::from(&file.relative),
                    line,
                    element: "img".to_string(),
                    attribute: "loading".to_string(),
                    value: "lazy".to_string(),
                })
        })
        .collect()
}

#[async_trait]
impl Analyzer for PerformanceAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["lazy-loading", "asset-size"]
    }

    async fn analyze(&self, root: &Path) -> CoreResult<AnalysisResult> {
        let this = self.clone();
        scan::blocking(NAME, root, move |root| this.scan(root)).await
    }
}
