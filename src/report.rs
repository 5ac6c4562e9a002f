//! Run reporting.
//!
//! One [`RunReport`] per pipeline run, with one entry per catalog package in
//! catalog order regardless of which task finished first. Renders as either
//! human-readable lines or JSON; both views come from the same data, so the
//! machine view is never poorer than the terminal one.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::BrokkrError;

/// Where in the per-package pipeline a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Compiling,
    Assembling,
    SynthesizingMetadata,
    Validating,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Compiling => "compiling",
            Stage::Assembling => "assembling",
            Stage::SynthesizingMetadata => "synthesizing-metadata",
            Stage::Validating => "validating",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Assembled, validated, and published.
    Built,
    Failed,
    /// Dry run: planned but deliberately not written.
    Planned,
}

/// Outcome for one package.
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub package: String,
    pub status: BuildStatus,
    /// Files the package contains (or would contain), relative to its
    /// directory.
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PackageReport {
    pub fn built(package: String, dir: &Path, files: &[PathBuf]) -> Self {
        Self {
            package,
            status: BuildStatus::Built,
            files: relative_strings(files),
            dir: Some(dir.display().to_string()),
            stage: None,
            error_class: None,
            error: None,
        }
    }

    pub fn planned(package: String, dir: &Path, files: &[PathBuf]) -> Self {
        Self {
            package,
            status: BuildStatus::Planned,
            files: relative_strings(files),
            dir: Some(dir.display().to_string()),
            stage: None,
            error_class: None,
            error: None,
        }
    }

    pub fn failed(package: String, stage: Stage, err: &BrokkrError) -> Self {
        Self {
            package,
            status: BuildStatus::Failed,
            files: Vec::new(),
            dir: None,
            stage: Some(stage),
            error_class: Some(err.class().to_string()),
            error: Some(err.to_string()),
        }
    }
}

fn relative_strings(files: &[PathBuf]) -> Vec<String> {
    files.iter().map(|p| p.display().to_string()).collect()
}

/// Everything one run produced, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub output_root: String,
    pub packages: Vec<PackageReport>,
}

impl RunReport {
    pub fn new(dry_run: bool, output_root: &Path, packages: Vec<PackageReport>) -> Self {
        Self {
            dry_run,
            output_root: output_root.display().to_string(),
            packages,
        }
    }

    pub fn built_count(&self) -> usize {
        self.packages
            .iter()
            .filter(|p| p.status != BuildStatus::Failed)
            .count()
    }

    pub fn total(&self) -> usize {
        self.packages.len()
    }

    /// False when any package failed; a dry run with no failures is a
    /// success.
    pub fn all_ok(&self) -> bool {
        self.built_count() == self.total()
    }

    pub fn summary(&self) -> String {
        if self.dry_run {
            format!(
                "Dry run complete: {}/{} packages planned, nothing written",
                self.built_count(),
                self.total()
            )
        } else {
            format!(
                "Build complete: {}/{} packages built successfully",
                self.built_count(),
                self.total()
            )
        }
    }

    /// Human-readable rendering: one line per package (plus the planned file
    /// list in a dry run), the summary line, and install hints when a real
    /// run fully succeeded.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for package in &self.packages {
            match package.status {
                BuildStatus::Built => {
                    out.push_str(&format!(
                        "{}: ok ({} files)\n",
                        package.package,
                        package.files.len()
                    ));
                }
                BuildStatus::Planned => {
                    out.push_str(&format!(
                        "{}: would write {} files\n",
                        package.package,
                        package.files.len()
                    ));
                    for file in &package.files {
                        out.push_str(&format!("  {file}\n"));
                    }
                }
                BuildStatus::Failed => {
                    let stage = package
                        .stage
                        .map(|s| s.as_str())
                        .unwrap_or("build");
                    let message = package.error.as_deref().unwrap_or("unknown failure");
                    out.push_str(&format!(
                        "{}: FAILED during {stage}: {message}\n",
                        package.package
                    ));
                }
            }
        }
        out.push_str(&self.summary());
        out.push('\n');
        if !self.dry_run && self.all_ok() && !self.packages.is_empty() {
            out.push_str("Install with:\n");
            for package in &self.packages {
                if let Some(dir) = &package.dir {
                    out.push_str(&format!("  pip install {dir}\n"));
                }
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
