//! Risk assessment: issue priority and fix risk, scored independently.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::issue::{Confidence, Issue};

/// How dangerous it is to apply a fix automatically.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FixRisk {
    #[default]
    Low,
    Medium,
    High,
}

impl FixRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixRisk::Low => "low",
            FixRisk::Medium => "medium",
            FixRisk::High => "high",
        }
    }

    pub fn max(self, other: FixRisk) -> FixRisk {
        if other > self {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for FixRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk assessment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Impact tags that name shared subsystems.
    pub shared_subsystems: BTreeSet<String>,
    /// Priority boost per shared-subsystem tag.
    pub blast_factor: f64,
    /// Priority multiplier for heuristic findings.
    pub heuristic_multiplier: f64,
    /// Globs for shared configuration files.
    pub shared_config_patterns: Vec<String>,
    /// Globs for build pipeline files.
    pub build_pipeline_patterns: Vec<String>,
    /// Fixes touching more files than this are high risk.
    pub max_isolated_files: usize,
    /// Highest fix risk that may be executed automatically.
    pub max_fix_risk: FixRisk,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            shared_subsystems: ["api", "auth", "database", "routing", "shared", "state"]
                .into_iter()
                .map(String::from)
                .collect(),
            blast_factor: 0.25,
            heuristic_multiplier: 0.5,
            shared_config_patterns: [
                "package.json",
                "package-lock.json",
                "yarn.lock",
                "pnpm-lock.yaml",
                "tsconfig*.json",
                ".env*",
                "Cargo.toml",
                "Cargo.lock",
                "*.config.js",
                "*.config.ts",
                "*.config.mjs",
                ".eslintrc*",
                ".gitignore",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            build_pipeline_patterns: [
                ".github/**",
                ".gitlab-ci.yml",
                "Dockerfile",
                "docker-compose*.yml",
                "Makefile",
                "Jenkinsfile",
                "vercel.json",
                "netlify.toml",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_isolated_files: 3,
            max_fix_risk: FixRisk::Low,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_fix_risk == FixRisk::High {
            return Err(CoreError::InvalidConfiguration(
                "max_fix_risk must be below high; high-risk fixes are never executed".to_string(),
            ));
        }
        if !(self.heuristic_multiplier > 0.0 && self.heuristic_multiplier <= 1.0) {
            return Err(CoreError::InvalidConfiguration(format!(
                "heuristic_multiplier must be in (0, 1], got {}",
                self.heuristic_multiplier
            )));
        }
        if self.blast_factor < 0.0 || !self.blast_factor.is_finite() {
            return Err(CoreError::InvalidConfiguration(format!(
                "blast_factor must be a non-negative number, got {}",
                self.blast_factor
            )));
        }
        if self.max_isolated_files == 0 {
            return Err(CoreError::InvalidConfiguration(
                "max_isolated_files must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scores for one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub priority: f64,
    pub fix_risk: FixRisk,
    /// Why the fix risk is not low.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

/// Scores issues for priority and fix risk.
#[derive(Debug, Clone)]
pub struct RiskAssessor {
    config: RiskConfig,
    shared_config: Vec<Pattern>,
    build_pipeline: Vec<Pattern>,
}

impl RiskAssessor {
    pub fn new(config: RiskConfig) -> CoreResult<Self> {
        config.validate()?;
        let shared_config = compile(&config.shared_config_patterns)?;
        let build_pipeline = compile(&config.build_pipeline_patterns)?;
        Ok(Self {
            config,
            shared_config,
            build_pipeline,
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn score(&self, issue: &Issue) -> RiskScore {
        let (fix_risk, reasons) = self.fix_risk(&issue.footprint());
        RiskScore {
            priority: self.priority(issue),
            fix_risk,
            reasons,
        }
    }

    /// severity weight × confidence multiplier × (1 + blast factor × shared tags)
    pub fn priority(&self, issue: &Issue) -> f64 {
        let confidence = match issue.confidence {
            Confidence::Certain => 1.0,
            Confidence::Heuristic => self.config.heuristic_multiplier,
        };
        let shared = issue
            .impact_tags
            .iter()
            .filter(|tag| self.config.shared_subsystems.contains(tag.as_str()))
            .count() as f64;
        issue.severity.weight() * confidence * (1.0 + self.config.blast_factor * shared)
    }

    /// Fix risk from the files a fix touches.
    pub fn fix_risk(&self, footprint: &BTreeSet<PathBuf>) -> (FixRisk, Vec<String>) {
        let mut reasons = Vec::new();

        if footprint.is_empty() {
            reasons.push("fix declares no files".to_string());
            return (FixRisk::High, reasons);
        }
        if footprint.len() > self.config.max_isolated_files {
            reasons.push(format!(
                "touches {} files (more than {})",
                footprint.len(),
                self.config.max_isolated_files
            ));
        }
        for path in footprint {
            if matches_any(&self.shared_config, path) {
                reasons.push(format!("{} is shared configuration", path.display()));
            } else if matches_any(&self.build_pipeline, path) {
                reasons.push(format!("{} is part of the build pipeline", path.display()));
            }
        }

        if !reasons.is_empty() {
            (FixRisk::High, reasons)
        } else if footprint.len() > 1 {
            reasons.push(format!("touches {} files", footprint.len()));
            (FixRisk::Medium, reasons)
        } else {
            (FixRisk::Low, reasons)
        }
    }

    /// Whether a fix at this risk may run automatically.
    pub fn is_executable(&self, risk: FixRisk) -> bool {
        risk != FixRisk::High && risk <= self.config.max_fix_risk
    }
}

fn compile(patterns: &[String]) -> CoreResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| {
                CoreError::InvalidConfiguration(format!("invalid glob '{}': {}", p, e))
            })
        })
        .collect()
}

/// Patterns without a separator match the file name; others match the
/// root-relative path.
fn matches_any(patterns: &[Pattern], path: &Path) -> bool {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    patterns.iter().any(|pattern| {
        if pattern.as_str().contains('/') {
            pattern.matches(&normalized)
        } else {
            pattern.matches(&file_name)
        }
    })
}
