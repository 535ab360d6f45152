//! Requests and results of the three public operations.

use std::path::PathBuf;

use semver::Version;
use serde::Serialize;

use crate::application::atomic::OverwriteMode;
use crate::application::ports::{HookResult, QualityFinding, QualityReport};
use crate::domain::merge::{ConflictRegion, FileUpdate};
use crate::domain::{RelativePath, TemplateId, TemplateRef, VariableMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    SuccessWithWarnings,
}

impl Outcome {
    fn from_warnings(warnings: &[String], quality: &QualityReport) -> Self {
        if warnings.is_empty() && quality.warnings.is_empty() {
            Self::Success
        } else {
            Self::SuccessWithWarnings
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerateOptions {
    pub interactive: bool,
    pub dry_run: bool,
    pub overwrite: OverwriteMode,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub template: TemplateRef,
    pub output_dir: PathBuf,
    pub variables: VariableMap,
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub template: String,
    pub output_dir: PathBuf,
    /// Files written, or that would be written in a dry run.
    pub files: Vec<RelativePath>,
    /// Rendered files left alone because they already existed.
    pub skipped: Vec<RelativePath>,
    pub variables: VariableMap,
    pub warnings: Vec<String>,
    pub quality: QualityReport,
    pub hooks: Vec<HookResult>,
    pub dry_run: bool,
}

impl GenerationResult {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_warnings(&self.warnings, &self.quality)
    }
}

#[derive(Debug, Clone)]
pub struct ModuleRequest {
    pub project_dir: PathBuf,
    pub module_type: String,
    pub module_name: String,
    pub variables: VariableMap,
    pub interactive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleResult {
    pub module_type: String,
    pub name: String,
    /// New files the module created.
    pub files: Vec<RelativePath>,
    /// Existing files edited by dependency or import insertions.
    pub modified: Vec<RelativePath>,
    pub warnings: Vec<String>,
    pub quality: QualityReport,
}

impl ModuleResult {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_warnings(&self.warnings, &self.quality)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStrategy {
    /// Merge template changes into user edits, marking conflicts.
    #[default]
    ThreeWayMerge,
    /// Locally modified files keep the user's content.
    KeepLocal,
    /// Every file takes the template's content.
    TakeTemplate,
}

impl std::str::FromStr for UpdateStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "three-way-merge" | "merge" => Ok(Self::ThreeWayMerge),
            "keep-local" => Ok(Self::KeepLocal),
            "take-template" => Ok(Self::TakeTemplate),
            other => Err(format!(
                "unknown strategy '{other}' (expected three-way-merge, keep-local or take-template)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub project_dir: PathBuf,
    /// Defaults to the newest available version.
    pub target_version: Option<Version>,
    pub strategy: UpdateStrategy,
    /// Delete files the template dropped, when the user never edited them.
    pub delete_removed: bool,
    pub variables: VariableMap,
    pub interactive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    Success,
    SuccessWithConflicts,
}

/// Conflict regions of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileConflicts {
    pub path: RelativePath,
    pub regions: Vec<ConflictRegion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub from: TemplateId,
    pub to: TemplateId,
    pub files: Vec<FileUpdate>,
    pub conflicts: Vec<FileConflicts>,
    /// Files still holding markers or sidecars after publish.
    pub unresolved_conflict_count: usize,
    pub stale_variables: Vec<String>,
    pub warnings: Vec<String>,
    pub quality: Vec<QualityFinding>,
}

impl UpdateReport {
    pub fn outcome(&self) -> UpdateOutcome {
        if self.unresolved_conflict_count > 0 {
            UpdateOutcome::SuccessWithConflicts
        } else {
            UpdateOutcome::Success
        }
    }

    pub fn is_noop(&self) -> bool {
        self.from == self.to
            && self
                .files
                .iter()
                .all(|f| f.state == crate::domain::merge::FileUpdateState::Unchanged)
    }
}
