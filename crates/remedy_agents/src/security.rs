//! Security analyzer.
//!
//! Looks for:
//! - Hardcoded secrets (API keys, tokens, passwords, private keys)
//! - Dynamic code evaluation
//! - Raw HTML injection

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use tracing::info;

use remedy_core::{AnalysisResult, Analyzer, AnalyzerMetrics, CoreResult, Issue, Severity};

use crate::error::AgentResult;
use crate::scan::{self, SourceFile, SCRIPT_EXTENSIONS};

const NAME: &str = "security";

/// Extensions scanned for secrets, on top of scripts.
const CONFIG_EXTENSIONS: &[&str] = &["json", "yml", "yaml", "toml", "py", "rb", "go", "java", "env"];

/// Values that are obviously not real secrets.
const PLACEHOLDERS: &[&str] = &["example", "placeholder", "changeme", "your_", "your-", "xxx", "<", "${", "process.env"];

#[derive(Debug, Clone)]
struct SecretRule {
    kind: &'static str,
    regex: Regex,
    /// Capture group holding the secret value, if any.
    value_group: Option<usize>,
}

/// Security analyzer.
#[derive(Debug, Clone)]
pub struct SecurityAnalyzer {
    secrets: Vec<SecretRule>,
    eval: Regex,
    inner_html: Regex,
}

impl SecurityAnalyzer {
    pub fn new() -> AgentResult<Self> {
        let rule = |kind, pattern: &str, value_group| -> AgentResult<SecretRule> {
            Ok(SecretRule {
                kind,
                regex: Regex::new(pattern)?,
                value_group,
            })
        };
        Ok(Self {
            secrets: vec![
                rule("AWS access key", r"\b(AKIA[0-9A-Z]{16})\b", Some(1))?,
                rule("GitHub token", r"\b(gh[pousr]_[A-Za-z0-9]{36,})\b", Some(1))?,
                rule("private key", r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----", None)?,
                rule(
                    "credential",
                    r#"(?i)\b(?:api[_-]?key|secret[_-]?key|access[_-]?token|auth[_-]?token|client[_-]?secret|password|passwd)["']?\s*[:=]\s*["']([^"'\s]{8,})["']"#,
                    Some(1),
                )?,
            ],
            eval: Regex::new(r"(?:^|[^\w.])eval\s*\(|new\s+Function\s*\(")?,
            inner_html: Regex::new(r"dangerouslySetInnerHTML|\.innerHTML\s*=")?,
        })
    }

    fn scan(&self, root: &Path) -> AnalysisResult {
        let mut issues = Vec::new();
        let mut files_scanned = 0;

        let extensions: Vec<&str> = SCRIPT_EXTENSIONS.iter().chain(CONFIG_EXTENSIONS).copied().collect();
        match scan::source_files(root, &extensions) {
            Ok(files) => {
                let files: Vec<SourceFile> = files.into_iter().filter(|f| !is_lockfile(f)).collect();
                files_scanned = files.len();
                scan::gather(NAME, "secrets", Ok(self.find_secrets(&files)), &mut issues);
                scan::gather(NAME, "code-injection", Ok(self.find_injection(&files)), &mut issues);
            }
            Err(e) => scan::gather(NAME, "walk", Err(e), &mut issues),
        }

        let secrets = issues.iter().filter(|i| i.issue_type == "hardcoded_secret").count();
        info!("🔒 Security scan: {} issue(s), {} secret(s)", issues.len(), secrets);
        AnalysisResult::new(NAME).with_issues(issues).with_metrics(
            AnalyzerMetrics::default()
                .with_files(files_scanned)
                .with_counter("secrets", secrets as u64),
        )
    }

    fn find_secrets(&self, files: &[SourceFile]) -> Vec<Issue> {
        let mut issues = Vec::new();
        for file in files {
            for (line_no, line) in file.numbered_lines() {
                let lower = line.to_lowercase();
                if PLACEHOLDERS.iter().any(|p| lower.contains(p)) {
                    continue;
                }
                let hit = self.secrets.iter().find_map(|rule| {
                    rule.regex.captures(line).map(|caps| {
                        let value = rule
                            .value_group
                            .and_then(|g| caps.get(g))
                            .map(|m| mask_secret(m.as_str()));
                        (rule.kind, value)
                    })
                });
                if let Some((kind, value)) = hit {
                    let message = match value {
                        Some(masked) => format!("Hardcoded {} ({})", kind, masked),
                        None => format!("Hardcoded {}", kind),
                    };
                    issues.push(
                        Issue::new("hardcoded_secret", Severity::Critical, NAME, message)
                            .at_file(&file.relative)
                            .at_line(line_no)
                            .with_recommendation("Move the value to an environment variable and rotate it")
                            .with_tags(["security", "auth"]),
                    );
                }
            }
        }
        issues
    }

    fn find_injection(&self, files: &[SourceFile]) -> Vec<Issue> {
        let mut issues = Vec::new();
        for file in files.iter().filter(|f| SCRIPT_EXTENSIONS.contains(&f.extension())) {
            for (line_no, line) in file.numbered_lines() {
                let trimmed = line.trim_start();
                if trimmed.starts_with("//") || trimmed.starts_with('*') {
                    continue;
                }
                if self.eval.is_match(line) {
                    issues.push(
                        Issue::new("eval_usage", Severity::High, NAME, "Dynamic code evaluation")
                            .at_file(&file.relative)
                            .at_line(line_no)
                            .with_recommendation("Replace eval/new Function with explicit parsing or dispatch")
                            .heuristic()
                            .with_tag("security"),
                    );
                }
                if self.inner_html.is_match(line) {
                    issues.push(
                        Issue::new("raw_html_injection", Severity::Medium, NAME, "Raw HTML is injected into the DOM")
                            .at_file(&file.relative)
                            .at_line(line_no)
                            .with_recommendation("Sanitize the HTML or render text content instead")
                            .heuristic()
                            .with_tag("security"),
                    );
                }
            }
        }
        issues
    }
}

fn is_lockfile(file: &SourceFile) -> bool {
    let name = file.file_name();
    name.ends_with(".lock") || name.ends_with("-lock.json") || name.ends_with("-lock.yaml")
}

fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

#[async_trait]
impl Analyzer for SecurityAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["secrets", "code-injection"]
    }

    async fn analyze(&self, root: &Path) -> CoreResult<AnalysisResult> {
        let this = self.clone();
        scan::blocking(NAME, root, move |root| this.scan(root)).await
    }
}
