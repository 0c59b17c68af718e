//! Validation pipeline configuration.
//!
//! Loaded from YAML or TOML, or detected from the repository's own build
//! files when nothing is configured.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use remedy_core::{CheckKind, Severity};

use crate::command::{CommandProvider, CommandSpec, DiagnosticPattern, ProcessRunner, ToolRunner};
use crate::error::{PolicyError, PolicyResult};
use crate::pipeline::ValidationPipeline;

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_issue_type() -> String {
    "diagnostic".to_string()
}

fn default_severity() -> Severity {
    Severity::Medium
}

/// How a check's output is turned into diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ParserConfig {
    /// TypeScript compiler output.
    Tsc,
    /// Custom regex; see [`DiagnosticPattern`] for the group names.
    Regex {
        pattern: String,
        #[serde(default = "default_issue_type")]
        issue_type: String,
        #[serde(default = "default_severity")]
        severity: Severity,
    },
}

impl ParserConfig {
    fn compile(&self) -> PolicyResult<DiagnosticPattern> {
        match self {
            ParserConfig::Tsc => DiagnosticPattern::tsc(),
            ParserConfig::Regex {
                pattern,
                issue_type,
                severity,
            } => DiagnosticPattern::new(pattern, issue_type.clone(), *severity),
        }
    }
}

/// One configured check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    pub name: String,
    pub kind: CheckKind,
    #[serde(flatten)]
    pub command: CommandSpec,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub parser: Option<ParserConfig>,
}

impl CheckConfig {
    pub fn new(name: impl Into<String>, kind: CheckKind, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            kind,
            command,
            timeout_secs: default_timeout_secs(),
            parser: None,
        }
    }

    pub fn with_parser(mut self, parser: ParserConfig) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the provider for this check.
    pub fn provider(&self, runner: Arc<dyn ToolRunner>) -> PolicyResult<CommandProvider> {
        let mut provider =
            CommandProvider::new(&self.name, self.kind, self.command.clone()).with_runner(runner);
        if let Some(parser) = &self.parser {
            provider = provider.with_pattern(parser.compile()?);
        }
        Ok(provider)
    }
}

/// Settings for the validation battery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_true")]
    pub fail_fast: bool,
    #[serde(default)]
    pub allow_preexisting_failures: bool,
    #[serde(default)]
    pub tolerate_line_shifts: bool,
    /// Empty means detect from the repository.
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fail_fast: true,
            allow_preexisting_failures: false,
            tolerate_line_shifts: false,
            checks: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(content: &str) -> PolicyResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> PolicyResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`, `.yml` or `.toml` file.
    pub fn from_file(path: &Path) -> PolicyResult<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Err(PolicyError::InvalidConfiguration(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> PolicyResult<()> {
        let mut seen = std::collections::BTreeSet::new();
        for check in &self.checks {
            if check.name.trim().is_empty() {
                return Err(PolicyError::InvalidConfiguration("check name is empty".to_string()));
            }
            if !seen.insert(check.name.as_str()) {
                return Err(PolicyError::InvalidConfiguration(format!(
                    "duplicate check name: {}",
                    check.name
                )));
            }
            if check.command.program.trim().is_empty() {
                return Err(PolicyError::InvalidConfiguration(format!(
                    "check {} has no program",
                    check.name
                )));
            }
            if check.timeout_secs == 0 {
                return Err(PolicyError::InvalidConfiguration(format!(
                    "check {} has a zero timeout",
                    check.name
                )));
            }
            if let Some(parser) = &check.parser {
                parser.compile()?;
            }
        }
        Ok(())
    }

    /// Configured checks, or the detected ones when none are configured.
    pub fn resolve_checks(&self, root: &Path) -> PolicyResult<Vec<CheckConfig>> {
        if !self.checks.is_empty() {
            return Ok(self.checks.clone());
        }
        let detected = detect(root)?;
        info!("Detected {} validation check(s)", detected.len());
        Ok(detected)
    }

    /// Build the pipeline, running commands as child processes.
    pub fn build(&self, root: &Path) -> PolicyResult<ValidationPipeline> {
        self.build_with_runner(root, Arc::new(ProcessRunner))
    }

    pub fn build_with_runner(
        &self,
        root: &Path,
        runner: Arc<dyn ToolRunner>,
    ) -> PolicyResult<ValidationPipeline> {
        let mut pipeline = ValidationPipeline::new()
            .fail_fast(self.fail_fast)
            .allow_preexisting_failures(self.allow_preexisting_failures)
            .tolerate_line_shifts(self.tolerate_line_shifts);
        for check in self.resolve_checks(root)? {
            debug!("Adding check {} ({})", check.name, check.command.display());
            pipeline.add_check(Arc::new(check.provider(runner.clone())?), check.timeout());
        }
        Ok(pipeline)
    }
}

/// Detect checks from `package.json` scripts or a Cargo manifest.
pub fn detect(root: &Path) -> PolicyResult<Vec<CheckConfig>> {
    let package_json = root.join("package.json");
    if package_json.is_file() {
        let manifest: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&package_json)?)?;
        let scripts = manifest.get("scripts").and_then(|s| s.as_object());

        let mut checks = Vec::new();
        let candidates = [
            ("typecheck", CheckKind::TypeCheck),
            ("build", CheckKind::Build),
            ("test", CheckKind::Test),
            ("lint", CheckKind::Lint),
        ];
        for (script, kind) in candidates {
            if scripts.map(|s| s.contains_key(script)).unwrap_or(false) {
                let mut check = CheckConfig::new(script, kind, CommandSpec::new("npm").args(["run", script]));
                if kind == CheckKind::TypeCheck {
                    check = check.with_parser(ParserConfig::Tsc);
                }
                checks.push(check);
            }
        }
        if checks.iter().all(|c| c.kind != CheckKind::TypeCheck) && root.join("tsconfig.json").is_file() {
            checks.push(
                CheckConfig::new("typecheck", CheckKind::TypeCheck, CommandSpec::new("npx").args(["tsc", "--noEmit"]))
                    .with_parser(ParserConfig::Tsc),
            );
        }
        return Ok(checks);
    }

    if root.join("Cargo.toml").is_file() {
        let cargo = |args: &[&str]| CommandSpec::new("cargo").args(args.iter().copied());
        return Ok(vec![
            CheckConfig::new("check", CheckKind::TypeCheck, cargo(&["check", "--all-targets"])),
            CheckConfig::new("build", CheckKind::Build, cargo(&["build"])),
            CheckConfig::new("test", CheckKind::Test, cargo(&["test"])),
            CheckConfig::new("clippy", CheckKind::Lint, cargo(&["clippy", "--all-targets"])),
        ]);
    }

    Ok(Vec::new())
}
