//! Deployment readiness: container images and environment files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use remedy_core::{AnalysisResult, Analyzer, AnalyzerMetrics, CoreResult, Issue, Severity};

use crate::error::AgentResult;
use crate::scan;

const NAME: &str = "deployment";

const ENV_TEMPLATES: &[&str] = &[".env.example", ".env.sample", ".env.template"];

#[derive(Debug, Clone, Default)]
pub struct DeploymentAnalyzer;

impl DeploymentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn scan(&self, root: &Path) -> AnalysisResult {
        let mut issues = Vec::new();

        let dockerfiles = scan::walk_files(root, |p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n == "Dockerfile" || n.starts_with("Dockerfile.") || n.ends_with(".Dockerfile"))
                .unwrap_or(false)
        });
        let files_scanned = dockerfiles.as_ref().map(Vec::len).unwrap_or(0);
        let images = dockerfiles.and_then(|files| {
            let mut found = Vec::new();
            for file in files {
                found.extend(unpinned_images(root, &file)?);
            }
            Ok(found)
        });
        scan::gather(NAME, "base-images", images, &mut issues);
        scan::gather(NAME, "env-files", env_files(root), &mut issues);

        info!("🚀 Deployment scan: {} issue(s)", issues.len());
        AnalysisResult::new(NAME)
            .with_issues(issues)
            .with_metrics(AnalyzerMetrics::default().with_files(files_scanned))
    }
}

/// `FROM` lines without a tag or digest, or on `latest`.
fn unpinned_images(root: &Path, dockerfile: &Path) -> AgentResult<Vec<Issue>> {
    let content = std::fs::read_to_string(root.join(dockerfile))?;
    let mut stages = BTreeSet::new();
    let mut issues = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.first().map(|w| !w.eq_ignore_ascii_case("FROM")).unwrap_or(true) {
            continue;
        }
        // Skip flags such as --platform.
        let Some(image) = words[1..].iter().copied().find(|w| !w.starts_with("--")) else {
            continue;
        };
        if let Some(pos) = words.iter().position(|w| w.eq_ignore_ascii_case("AS")) {
            if let Some(stage) = words.get(pos + 1) {
                stages.insert(stage.to_ascii_lowercase());
            }
        }
        if image.eq_ignore_ascii_case("scratch") || image.contains('$') || stages.contains(&image.to_ascii_lowercase()) {
            continue;
        }
        if image.contains('@') {
            continue;
        }

        // A ':' after the last '/' is a tag; before it, a registry port.
        let name_part = image.rsplit('/').next().unwrap_or(image);
        let tag = name_part.split_once(':').map(|(_, t)| t);
        let problem = match tag {
            None => Some("has no tag"),
            Some("latest") => Some("uses the latest tag"),
            _ => None,
        };
        if let Some(problem) = problem {
            issues.push(
                Issue::new(
                    "unpinned_base_image",
                    Severity::Medium,
                    NAME,
                    format!("Base image {} {}", image, problem),
                )
                .at_file(dockerfile)
                .at_line(i as u32 + 1)
                .with_recommendation("Pin the base image to a version tag or digest")
                .with_tag("build"),
            );
        }
    }
    Ok(issues)
}

fn env_files(root: &Path) -> AgentResult<Vec<Issue>> {
    let mut issues = Vec::new();
    if !root.join(".env").is_file() {
        return Ok(issues);
    }

    if !ENV_TEMPLATES.iter().any(|t| root.join(t).is_file()) {
        issues.push(
            Issue::new(
                "missing_env_example",
                Severity::Low,
                NAME,
                ".env exists but there is no .env.example documenting it",
            )
            .at_file(PathBuf::from(".env"))
            .with_recommendation("Commit a .env.example listing every variable without real values"),
        );
    }

    let gitignore = root.join(".gitignore");
    let ignored = if gitignore.is_file() {
        std::fs::read_to_string(&gitignore)?
            .lines()
            .map(str::trim)
            .any(|l| matches!(l, ".env" | "/.env" | ".env*" | "*.env" | ".env.*"))
    } else {
        false
    };
    if !ignored {
        issues.push(
            Issue::new("env_not_ignored", Severity::High, NAME, ".env is not listed in .gitignore")
                .at_file(PathBuf::from(".gitignore"))
                .with_recommendation("Add .env to .gitignore and rotate anything already committed")
                .with_tags(["security", "config"]),
        );
    }
    Ok(issues)
}

#[async_trait]
impl Analyzer for DeploymentAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["docker", "environment"]
    }

    async fn analyze(&self, root: &Path) -> CoreResult<AnalysisResult> {
        let this = self.clone();
        scan::blocking(NAME, root, move |root| this.scan(root)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_base_images() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join("Dockerfile"),
            "FROM node AS deps\n\
             FROM --platform=linux/amd64 node:20-alpine AS build\n\
             FROM registry.local:5000/base\n\
             FROM nginx:latest\n\
             FROM deps\n\
             FROM alpine@sha256:abc\n",
        )
        .unwrap();

        let result = DeploymentAnalyzer::new().analyze(temp.path()).await.unwrap();
        let lines: Vec<u32> = result.issues.iter().filter_map(|i| i.line).collect();
        assert_eq!(lines, vec![1, 3, 4]);
        assert!(result.issues.iter().all(|i| i.issue_type == "unpinned_base_image"));
        assert_eq!(result.metrics.files_scanned, 1);
    }

    #[tokio::test]
    async fn test_env_files() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(".env"), "SECRET=1\n").unwrap();

        let result = DeploymentAnalyzer::new().analyze(temp.path()).await.unwrap();
        let types: Vec<&str> = result.issues.iter().map(|i| i.issue_type.as_str()).collect();
        assert_eq!(types, vec!["missing_env_example", "env_not_ignored"]);

        std::fs::write(temp.path().join(".gitignore"), "node_modules\n.env\n").unwrap();
        std::fs::write(temp.path().join(".env.example"), "SECRET=\n").unwrap();
        let result = DeploymentAnalyzer::new().analyze(temp.path()).await.unwrap();
        assert!(result.issues.is_empty());
    }
}
