//! Dependency hygiene for npm manifests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use remedy_core::{AnalysisResult, Analyzer, AnalyzerMetrics, CoreResult, FixDescriptor, Issue, Severity};

use crate::error::{AgentError, AgentResult};
use crate::scan;

const NAME: &str = "dependency";

pub(crate) const SECTIONS: &[&str] = &["dependencies", "devDependencies", "optionalDependencies"];
const LOCKFILES: &[&str] = &["package-lock.json", "npm-shrinkwrap.json", "yarn.lock", "pnpm-lock.yaml", "bun.lockb"];

/// Version specs that are not registry ranges and are left alone.
const NON_REGISTRY_PREFIXES: &[&str] = &["workspace:", "file:", "link:", "git", "http", "npm:", "github:"];

#[derive(Debug, Clone, Default)]
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// `package.json` files under `root`, relative to it.
    pub fn manifests(root: &Path) -> AgentResult<Vec<PathBuf>> {
        scan::walk_files(root, |p| p.file_name().map(|n| n == "package.json").unwrap_or(false))
    }

    fn scan(&self, root: &Path) -> AnalysisResult {
        let mut issues = Vec::new();
        let manifests = match Self::manifests(root) {
            Ok(found) => found,
            Err(e) => {
                scan::gather(NAME, "manifests", Err(e), &mut issues);
                Vec::new()
            }
        };

        for manifest in &manifests {
            let check = format!("manifest {}", manifest.display());
            scan::gather(NAME, &check, check_manifest(root, manifest), &mut issues);
        }

        let unpinned = issues.iter().filter(|i| i.issue_type == "unpinned_dependency").count();
        info!("📦 Dependency scan: {} manifest(s), {} unpinned", manifests.len(), unpinned);
        AnalysisResult::new(NAME).with_issues(issues).with_metrics(
            AnalyzerMetrics::default()
                .with_files(manifests.len())
                .with_counter("unpinned", unpinned as u64),
        )
    }
}

fn check_manifest(root: &Path, manifest: &Path) -> AgentResult<Vec<Issue>> {
    let content = std::fs::read_to_string(root.join(manifest))?;
    let parsed: Value = serde_json::from_str(&content).map_err(|e| AgentError::parse(manifest, e.to_string()))?;
    let dir = manifest.parent().unwrap_or_else(|| Path::new(""));

    let lockfile = LOCKFILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| root.join(path).is_file());
    let locked = match &lockfile {
        Some(path) if path.file_name().map(|n| n == "package-lock.json").unwrap_or(false) => {
            locked_versions(&root.join(path)).unwrap_or_else(|e| {
                debug!("Ignoring unreadable lockfile {}: {}", path.display(), e);
                BTreeMap::new()
            })
        }
        _ => BTreeMap::new(),
    };

    let mut issues = Vec::new();
    let mut total = 0;
    for section in SECTIONS {
        let Some(deps) = parsed.get(*section).and_then(Value::as_object) else {
            continue;
        };
        for (package, spec) in deps {
            total += 1;
            let Some(spec) = spec.as_str() else { continue };
            if !is_range(spec) {
                continue;
            }
            let line = line_of_key(&content, section, package);
            let mut issue = Issue::new(
                "unpinned_dependency",
                Severity::Medium,
                NAME,
                format!("{} uses the range \"{}\"", package, spec),
            )
            .at_file(manifest)
            .with_recommendation("Pin the exact version so builds are reproducible")
            .with_tag("build");
            if let Some(line) = line {
                issue = issue.at_line(line);
            }
            if let Some(version) = locked.get(package) {
                issue = issue.with_fix(FixDescriptor::PinDependency {
                    manifest: manifest.to_path_buf(),
                    package: package.clone(),
                    version: version.clone(),
                });
            }
            issues.push(issue);
        }
    }

    if let (Some(runtime), Some(dev)) = (
        parsed.get("dependencies").and_then(Value::as_object),
        parsed.get("devDependencies").and_then(Value::as_object),
    ) {
        for package in runtime.keys().filter(|k| dev.contains_key(*k)) {
            let mut issue = Issue::new(
                "duplicate_dependency",
                Severity::Low,
                NAME,
                format!("{} is listed in both dependencies and devDependencies", package),
            )
            .at_file(manifest)
            .with_recommendation("Keep the package in one section only");
            if let Some(line) = line_of_key(&content, "devDependencies", package) {
                issue = issue.at_line(line);
            }
            issues.push(issue);
        }
    }

    if lockfile.is_none() && total > 0 {
        issues.push(
            Issue::new("missing_lockfile", Severity::High, NAME, "No lockfile next to the manifest")
                .at_file(manifest)
                .with_recommendation("Commit the lockfile produced by your package manager")
                .with_tag("build"),
        );
    }
    Ok(issues)
}

fn is_range(spec: &str) -> bool {
    let spec = spec.trim();
    if NON_REGISTRY_PREFIXES.iter().any(|p| spec.starts_with(p)) {
        return false;
    }
    spec.is_empty()
        || spec == "latest"
        || spec == "*"
        || spec.contains(['^', '~', '>', '<', '|', 'x', 'X', '*'])
}

/// Resolved versions from a `package-lock.json` (v1, v2 and v3 layouts).
fn locked_versions(lockfile: &Path) -> AgentResult<BTreeMap<String, String>> {
    let parsed: Value = serde_json::from_str(&std::fs::read_to_string(lockfile)?)?;
    let mut versions = BTreeMap::new();

    if let Some(packages) = parsed.get("packages").and_then(Value::as_object) {
        for (key, entry) in packages {
            // Only top-level installs; nested ones belong to other packages.
            let Some(name) = key.strip_prefix("node_modules/") else { continue };
            if name.contains("/node_modules/") {
                continue;
            }
            if let Some(version) = entry.get("version").and_then(Value::as_str) {
                versions.insert(name.to_string(), version.to_string());
            }
        }
    } else if let Some(deps) = parsed.get("dependencies").and_then(Value::as_object) {
        for (name, entry) in deps {
            if let Some(version) = entry.get("version").and_then(Value::as_str) {
                versions.insert(name.clone(), version.to_string());
            }
        }
    }
    Ok(versions)
}

/// 1-based line of `"package":` inside the `"section"` object.
fn line_of_key(content: &str, section: &str, package: &str) -> Option<u32> {
    let section_key = format!("\"{}\"", section);
    let package_key = format!("\"{}\"", package);
    let mut in_section = false;
    for (i, line) in content.lines().enumerate() {
        if !in_section {
            in_section = line.contains(&section_key);
            continue;
        }
        if line.contains(&package_key) && line.contains(':') {
            return Some(i as u32 + 1);
        }
        if line.trim_start().starts_with('}') {
            return None;
        }
    }
    None
}

#[async_trait]
impl Analyzer for DependencyAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["npm", "lockfile", "version-pinning"]
    }

    async fn analyze(&self, root: &Path) -> CoreResult<AnalysisResult> {
        let this = self.clone();
        scan::blocking(NAME, root, move |root| this.scan(root)).await
    }
}
