//! Issue model shared by analyzers, the planner and the report.
//!
//! An [`Issue`] is a single finding. Its identity is the
//! `(type, file, line)` triple ([`IssueKey`]); two analyzers reporting the
//! same key are describing the same problem and are merged by the
//! [`IssueStore`](crate::store::IssueStore).

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Issue type used when an analyzer or one of its sub-checks could not finish.
pub const ANALYSIS_INCOMPLETE: &str = "analysis_incomplete";

/// Bug severity. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by the risk assessor.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Low => 1.0,
            Severity::Medium => 2.0,
            Severity::High => 3.0,
            Severity::Critical => 4.0,
        }
    }

    /// High and critical issues block a clean exit when left unresolved.
    pub fn is_blocking(&self) -> bool {
        *self >= Severity::High
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// All severities, most severe first.
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How sure an analyzer is about a finding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    #[default]
    Certain,
    Heuristic,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Certain => "certain",
            Confidence::Heuristic => "heuristic",
        }
    }
}

/// Identity of an issue for de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueKey {
    pub issue_type: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
}

impl IssueKey {
    /// Build a key. File separators are normalized to `/` so the key and the
    /// id agree on what counts as the same file.
    pub fn new(issue_type: impl Into<String>, file: Option<PathBuf>, line: Option<u32>) -> Self {
        Self {
            issue_type: issue_type.into(),
            file: file.map(normalize_separators),
            line,
        }
    }

    /// Deterministic id derived from the key.
    pub fn id(&self) -> IssueId {
        let file = self
            .file
            .as_deref()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "-".to_string());
        let line = self.line.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
        IssueId(format!("{}@{}:{}", self.issue_type, file, line))
    }
}

fn normalize_separators(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(text) if text.contains('\\') => PathBuf::from(text.replace('\\', "/")),
        _ => path,
    }
}

/// Stable issue identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(String);

impl IssueId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Machine-readable description of how to fix an issue.
///
/// Paths are relative to the repository root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixDescriptor {
    /// Add `attribute="value"` to every `<element` tag on `line` missing it.
    InsertAttribute {
        file: PathBuf,
        line: u32,
        element: String,
        attribute: String,
        value: String,
    },
    /// Delete `line`, which must still read `expected` once trimmed.
    RemoveLine {
        file: PathBuf,
        line: u32,
        expected: String,
    },
    /// Replace the first `find` on `line` (or anywhere in the file).
    ReplaceText {
        file: PathBuf,
        line: Option<u32>,
        find: String,
        replace: String,
    },
    /// Pin `package` to an exact `version` in a manifest.
    PinDependency {
        manifest: PathBuf,
        package: String,
        version: String,
    },
    /// Free-form fix for custom handlers.
    Custom {
        files: Vec<PathBuf>,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl FixDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            FixDescriptor::InsertAttribute { .. } => "insert_attribute",
            FixDescriptor::RemoveLine { .. } => "remove_line",
            FixDescriptor::ReplaceText { .. } => "replace_text",
            FixDescriptor::PinDependency { .. } => "pin_dependency",
            FixDescriptor::Custom { .. } => "custom",
        }
    }

    /// Files the fix is allowed to touch.
    pub fn footprint(&self) -> BTreeSet<PathBuf> {
        match self {
            FixDescriptor::InsertAttribute { file, .. }
            | FixDescriptor::RemoveLine { file, .. }
            | FixDescriptor::ReplaceText { file, .. } => BTreeSet::from([file.clone()]),
            FixDescriptor::PinDependency { manifest, .. } => BTreeSet::from([manifest.clone()]),
            FixDescriptor::Custom { files, .. } => files.iter().cloned().collect(),
        }
    }
}

/// A single finding reported by an analyzer.
///
/// Issues are built once by the reporting analyzer and never changed
/// afterwards; every `with_*`/`at_*` builder keeps `id` in sync with the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub confidence: Confidence,
    pub source_analyzer: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
    pub message: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub auto_fixable: bool,
    #[serde(default)]
    pub fix: Option<FixDescriptor>,
    #[serde(default)]
    pub impact_tags: BTreeSet<String>,
}

impl Issue {
    /// Create an issue without a location.
    pub fn new(
        issue_type: impl Into<String>,
        severity: Severity,
        source_analyzer: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let issue_type = issue_type.into();
        Self {
            id: IssueKey::new(issue_type.clone(), None, None).id(),
            issue_type,
            severity,
            confidence: Confidence::Certain,
            source_analyzer: source_analyzer.into(),
            file: None,
            line: None,
            message: message.into(),
            recommendation: String::new(),
            auto_fixable: false,
            fix: None,
            impact_tags: BTreeSet::new(),
        }
    }

    /// Low-severity marker for an analyzer or sub-check that could not run.
    pub fn analysis_incomplete(analyzer: impl Into<String>, detail: impl Into<String>) -> Self {
        let analyzer = analyzer.into();
        let scope = PathBuf::from(format!("<{}>", analyzer));
        Issue::new(
            ANALYSIS_INCOMPLETE,
            Severity::Low,
            analyzer.clone(),
            format!("Analysis by '{}' did not complete: {}", analyzer, detail.into()),
        )
        .at_file(scope)
        .with_recommendation("Re-run the analysis; results for this analyzer may be partial")
    }

    /// Set file location.
    pub fn at_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self.rekey()
    }

    /// Set line number.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self.rekey()
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = recommendation.into();
        self
    }

    /// Attach a fix and mark the issue auto-fixable.
    pub fn with_fix(mut self, fix: FixDescriptor) -> Self {
        self.fix = Some(fix);
        self.auto_fixable = true;
        self
    }

    /// Attach a fix that must be applied by hand.
    pub fn suggest_fix(mut self, fix: FixDescriptor) -> Self {
        self.fix = Some(fix);
        self.auto_fixable = false;
        self
    }

    pub fn heuristic(mut self) -> Self {
        self.confidence = Confidence::Heuristic;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.impact_tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.impact_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn key(&self) -> IssueKey {
        IssueKey::new(self.issue_type.clone(), self.file.clone(), self.line)
    }

    /// Files the attached fix would touch. Empty when there is no fix.
    pub fn footprint(&self) -> BTreeSet<PathBuf> {
        self.fix.as_ref().map(FixDescriptor::footprint).unwrap_or_default()
    }

    /// Short location string for reports.
    pub fn location(&self) -> String {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => format!("{}:{}", display_path(file), line),
            (Some(file), None) => display_path(file),
            _ => "-".to_string(),
        }
    }

    fn rekey(mut self) -> Self {
        self.id = self.key().id();
        self
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
