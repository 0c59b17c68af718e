//! Diagnostic provider backed by an external command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use remedy_core::{CheckKind, Issue, Severity};

use crate::error::{PolicyError, PolicyResult};
use crate::provider::{DiagnosticProvider, DiagnosticReport};

/// A command line to run inside the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory relative to the repository root.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|a| a.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs commands. Abstracted so providers can be tested without processes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, root: &Path, spec: &CommandSpec) -> PolicyResult<CommandOutput>;
}

/// Runs commands as child processes.
///
/// Children are killed when the future is dropped, so a pipeline timeout
/// never leaves a process behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, root: &Path, spec: &CommandSpec) -> PolicyResult<CommandOutput> {
        let workdir = match &spec.workdir {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };
        debug!("Running {} in {}", spec.display(), workdir.display());

        let started = Instant::now();
        let output = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .envs(&spec.env)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PolicyError::CommandFailed {
                command: spec.display(),
                message: e.to_string(),
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Extracts diagnostics from command output, one line at a time.
///
/// Recognized named groups: `file`, `line`, `message` (required), and the
/// optional `code` (appended to the issue type) and `severity`
/// (`error`/`warning`/`info`).
#[derive(Debug, Clone)]
pub struct DiagnosticPattern {
    regex: Regex,
    issue_type: String,
    severity: Severity,
}

impl DiagnosticPattern {
    pub fn new(pattern: &str, issue_type: impl Into<String>, severity: Severity) -> PolicyResult<Self> {
        let regex = Regex::new(pattern)?;
        if !regex.capture_names().flatten().any(|n| n == "message") {
            return Err(PolicyError::InvalidConfiguration(format!(
                "diagnostic pattern needs a 'message' group: {}",
                pattern
            )));
        }
        Ok(Self {
            regex,
            issue_type: issue_type.into(),
            severity,
        })
    }

    /// TypeScript compiler output, e.g. `src/a.ts(3,5): error TS2322: ...`.
    pub fn tsc() -> PolicyResult<Self> {
        Self::new(
            r"^(?P<file>[^\s(][^(]*)\((?P<line>\d+),\d+\):\s*(?P<severity>error|warning)\s+(?P<code>TS\d+):\s*(?P<message>.+)$",
            "type_error",
            Severity::High,
        )
    }

    pub fn parse(&self, output: &str, source: &str) -> Vec<Issue> {
        output
            .lines()
            .filter_map(|line| self.regex.captures(line.trim_end()))
            .map(|caps| {
                let issue_type = match caps.name("code") {
                    Some(code) => format!("{}:{}", self.issue_type, code.as_str()),
                    None => self.issue_type.clone(),
                };
                let severity = match caps.name("severity").map(|s| s.as_str().to_ascii_lowercase()) {
                    Some(s) if s == "error" => Severity::High,
                    Some(s) if s == "warning" => Severity::Medium,
                    Some(s) if s == "info" || s == "note" => Severity::Low,
                    _ => self.severity,
                };
                let message = caps.name("message").map(|m| m.as_str().trim()).unwrap_or_default();

                let mut issue = Issue::new(issue_type, severity, source, message);
                if let Some(file) = caps.name("file") {
                    issue = issue.at_file(file.as_str().trim());
                }
                if let Some(line) = caps.name("line").and_then(|l| l.as_str().parse().ok()) {
                    issue = issue.at_line(line);
                }
                issue
            })
            .collect()
    }
}

/// Provider that runs a command and reads diagnostics from its output.
pub struct CommandProvider {
    name: String,
    kind: CheckKind,
    spec: CommandSpec,
    runner: Arc<dyn ToolRunner>,
    pattern: Option<DiagnosticPattern>,
}

impl CommandProvider {
    pub fn new(name: impl Into<String>, kind: CheckKind, spec: CommandSpec) -> Self {
        Self {
            name: name.into(),
            kind,
            spec,
            runner: Arc::new(ProcessRunner),
            pattern: None,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_pattern(mut self, pattern: DiagnosticPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }
}

impl std::fmt::Debug for CommandProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProvider")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("command", &self.spec.display())
            .finish()
    }
}

#[async_trait]
impl DiagnosticProvider for CommandProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CheckKind {
        self.kind
    }

    async fn run(&self, root: &Path) -> PolicyResult<DiagnosticReport> {
        let output = self.runner.run(root, &self.spec).await?;

        let source = format!("validation:{}", self.name);
        let diagnostics = match &self.pattern {
            Some(pattern) => {
                let mut found = pattern.parse(&output.stdout, &source);
                found.extend(pattern.parse(&output.stderr, &source));
                found
            }
            None => Vec::new(),
        };

        let detail = if output.success() {
            format!("{} succeeded ({}ms)", self.spec.display(), output.duration_ms)
        } else {
            let tail = if output.stderr.trim().is_empty() {
                &output.stdout
            } else {
                &output.stderr
            };
            let truncated: String = tail.trim().chars().take(500).collect();
            match output.exit_code {
                Some(code) => format!("exit code {}: {}", code, truncated),
                None => format!("terminated by signal: {}", truncated),
            }
        };

        Ok(DiagnosticReport {
            passed: output.success(),
            detail,
            diagnostics,
        })
    }
}
