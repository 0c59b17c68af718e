//! De-duplicating collection of issues with provenance.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::analyzer::AnalysisResult;
use crate::issue::{Issue, IssueId, IssueKey, Severity};

/// An issue plus every analyzer that reported its key.
#[derive(Debug, Clone, Serialize)]
pub struct StoredIssue {
    pub issue: Issue,
    pub reported_by: BTreeSet<String>,
}

/// What happened to an issue handed to [`IssueStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    Replaced,
    Merged,
}

/// Aggregated issues, keyed and iterated by identity key.
#[derive(Debug, Clone, Default)]
pub struct IssueStore {
    issues: BTreeMap<IssueKey, StoredIssue>,
    ids: HashMap<IssueId, IssueKey>,
}

impl IssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from analyzer results in the order given.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a AnalysisResult>) -> Self {
        let mut store = Self::new();
        for result in results {
            store.extend(result.issues.iter().cloned());
        }
        store
    }

    /// Insert an issue, merging with an existing record for the same key.
    ///
    /// The higher severity wins. On a tie the existing record stays unless it
    /// has no fix and the newcomer does.
    pub fn insert(&mut self, issue: Issue) -> InsertOutcome {
        let key = issue.key();
        let analyzer = issue.source_analyzer.clone();

        match self.issues.get_mut(&key) {
            Some(stored) => {
                stored.reported_by.insert(analyzer);
                let replace = issue.severity > stored.issue.severity
                    || (issue.severity == stored.issue.severity
                        && stored.issue.fix.is_none()
                        && issue.fix.is_some());
                if replace {
                    debug!("Replacing issue {} with report from {}", issue.id, issue.source_analyzer);
                    stored.issue = issue;
                    InsertOutcome::Replaced
                } else {
                    InsertOutcome::Merged
                }
            }
            None => {
                self.ids.insert(issue.id.clone(), key.clone());
                self.issues.insert(
                    key,
                    StoredIssue {
                        issue,
                        reported_by: BTreeSet::from([analyzer]),
                    },
                );
                InsertOutcome::Added
            }
        }
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        for issue in issues {
            self.insert(issue);
        }
    }

    pub fn get(&self, id: &IssueId) -> Option<&Issue> {
        self.ids
            .get(id)
            .and_then(|key| self.issues.get(key))
            .map(|stored| &stored.issue)
    }

    /// Analyzers that reported the issue.
    pub fn provenance(&self, id: &IssueId) -> Option<&BTreeSet<String>> {
        self.ids
            .get(id)
            .and_then(|key| self.issues.get(key))
            .map(|stored| &stored.reported_by)
    }

    /// Issues in identity-key order.
    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.values().map(|stored| &stored.issue)
    }

    pub fn stored(&self) -> impl Iterator<Item = &StoredIssue> {
        self.issues.values()
    }

    pub fn by_severity(&self, severity: Severity) -> Vec<&Issue> {
        self.iter().filter(|i| i.severity == severity).collect()
    }

    /// Issues reported by `analyzer`, including merged reports.
    pub fn by_analyzer(&self, analyzer: &str) -> Vec<&Issue> {
        self.issues
            .values()
            .filter(|stored| stored.reported_by.contains(analyzer))
            .map(|stored| &stored.issue)
            .collect()
    }

    pub fn auto_fixable(&self) -> Vec<&Issue> {
        self.iter().filter(|i| i.auto_fixable && i.fix.is_some()).collect()
    }

    /// High and critical issues, regardless of what happened to them.
    pub fn unresolved_blocking(&self) -> Vec<&Issue> {
        self.iter().filter(|i| i.severity.is_blocking()).collect()
    }

    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for issue in self.iter() {
            *counts.entry(issue.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::issue::FixDescriptor;

    fn issue(analyzer: &str, severity: Severity) -> Issue {
        Issue::new("missing_alt_text", severity, analyzer, "image without alt")
            .at_file("src/App.tsx")
            .at_line(7)
    }

    fn fix() -> FixDescriptor {
        FixDescriptor::InsertAttribute {
            file: PathBuf::from("src/App.tsx"),
            line: 7,
            element: "img".to_string(),
            attribute: "alt".to_string(),
            value: String::new(),
        }
    }

    #[test]
    fn test_dedup_higher_severity_wins() {
        let mut store = IssueStore::new();
        assert_eq!(store.insert(issue("performance", Severity::Low)), InsertOutcome::Added);
        assert_eq!(store.insert(issue("accessibility", Severity::High)), InsertOutcome::Replaced);
        assert_eq!(store.insert(issue("security", Severity::Medium)), InsertOutcome::Merged);

        assert_eq!(store.len(), 1);
        let kept = store.iter().next().unwrap();
        assert_eq!(kept.severity, Severity::High);
        assert_eq!(kept.source_analyzer, "accessibility");

        let provenance = store.provenance(&kept.id).unwrap();
        assert_eq!(provenance.len(), 3);
        assert_eq!(store.by_analyzer("security").len(), 1);
    }

    #[test]
    fn test_tie_prefers_record_with_fix() {
        let mut store = IssueStore::new();
        store.insert(issue("performance", Severity::Medium));
        let outcome = store.insert(issue("accessibility", Severity::Medium).with_fix(fix()));
        assert_eq!(outcome, InsertOutcome::Replaced);
        assert_eq!(store.auto_fixable().len(), 1);

        // A later tie without a fix never displaces the fixable record.
        let outcome = store.insert(issue("security", Severity::Medium));
        assert_eq!(outcome, InsertOutcome::Merged);
        assert_eq!(store.iter().next().unwrap().source_analyzer, "accessibility");
    }

    #[test]
    fn test_queries() {
        let mut store = IssueStore::new();
        store.insert(issue("accessibility", Severity::High));
        store.insert(Issue::new("focused_test", Severity::Critical, "test-quality", "it.only"));
        store.insert(Issue::new("console_log", Severity::Low, "code-quality", "console.log"));

        assert_eq!(store.by_severity(Severity::Low).len(), 1);
        assert_eq!(store.unresolved_blocking().len(), 2);
        assert_eq!(store.severity_counts().get(&Severity::Critical), Some(&1));

        let id = IssueKey::new("focused_test", None, None).id();
        assert_eq!(store.get(&id).unwrap().source_analyzer, "test-quality");
    }
}
