//! Driven (output) ports - implemented by infrastructure.
//!
//! These traits define what the application needs from external systems.
//! The `kiln-adapters` crate provides implementations; the CLI provides the
//! interactive `Prompter`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{
    ProjectStructure, QualityCheckSpec, RelativePath, Template, TemplateRef, TemplateSummary,
    VariableDefinition, VariableMap, VariableValue,
};
use crate::error::KilnResult;

/// What a path under a listed root is, seen without following links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// A symbolic link and the target it stores, verbatim.
    Symlink(PathBuf),
}

/// One entry of [`Filesystem::list_entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub path: RelativePath,
    pub kind: EntryKind,
}

/// Port for filesystem operations.
///
/// Implemented by:
/// - `kiln_adapters::filesystem::LocalFilesystem` (production)
///
/// Every write the atomic writer performs goes through this trait, so tests
/// can inject a fault at any step of a publish.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait Filesystem: Send + Sync {
    /// Create a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> KilnResult<()>;

    /// Write bytes to a file, replacing any previous content.
    fn write_file(&self, path: &Path, content: &[u8]) -> KilnResult<()>;

    fn read_file(&self, path: &Path) -> KilnResult<Vec<u8>>;

    fn copy_file(&self, from: &Path, to: &Path) -> KilnResult<()>;

    /// Set file permissions.
    fn set_permissions(&self, path: &Path, executable: bool) -> KilnResult<()>;

    /// Check if path exists.
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Rename a file or directory. Both paths are on the same filesystem.
    fn rename(&self, from: &Path, to: &Path) -> KilnResult<()>;

    fn remove_file(&self, path: &Path) -> KilnResult<()>;

    /// Remove a directory and all contents.
    fn remove_dir_all(&self, path: &Path) -> KilnResult<()>;

    /// Every regular file under `root`, relative to it, sorted.
    fn list_files(&self, root: &Path) -> KilnResult<Vec<RelativePath>>;

    /// Every entry under `root`: files, directories and symlinks, sorted so
    /// a directory comes before its contents. Links are not followed.
    fn list_entries(&self, root: &Path) -> KilnResult<Vec<FsEntry>>;

    /// Create `link` pointing at `original`, stored as given.
    fn symlink(&self, original: &Path, link: &Path) -> KilnResult<()>;
}

/// A template handed out by a store, with non-fatal notes from loading or
/// fetching (large template, stale cache used, ...).
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub template: Arc<Template>,
    pub warnings: Vec<String>,
}

impl ResolvedTemplate {
    pub fn new(template: Arc<Template>) -> Self {
        Self {
            template,
            warnings: Vec::new(),
        }
    }
}

/// Port for template storage and retrieval.
///
/// Implemented by:
/// - `kiln_adapters::template_store::CacheStore` (cache + remote sync)
/// - `kiln_adapters::template_store::InMemoryStore` (tests)
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait TemplateStore: Send + Sync {
    /// Resolve a reference to a loaded template, fetching and caching
    /// remote sources as needed.
    fn resolve(&self, reference: &TemplateRef) -> KilnResult<ResolvedTemplate>;

    /// Re-fetch a cached template from its recorded source.
    ///
    /// Returns `true` when the cache changed.
    fn refresh(&self, name: &str) -> KilnResult<bool>;

    /// List all cached templates.
    fn list(&self) -> KilnResult<Vec<TemplateSummary>>;
}

/// Which part of a template to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderScope {
    /// The main project tree.
    Project,
    /// The tree of one module type.
    Module(String),
}

/// Port for template rendering.
///
/// Implemented by:
/// - `kiln_adapters::renderer::ParallelRenderer` (rayon)
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait TemplateRenderer: Send + Sync {
    /// Render a template into a project structure.
    ///
    /// # Arguments
    ///
    /// * `template` - The template to render
    /// * `scope` - Project tree or a module tree
    /// * `variables` - Fully collected and validated answers
    fn render(
        &self,
        template: &Template,
        scope: &RenderScope,
        variables: &VariableMap,
    ) -> KilnResult<ProjectStructure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    PreGenerate,
    PostGenerate,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreGenerate => "pre_generate",
            Self::PostGenerate => "post_generate",
        }
    }
}

/// Message sent to the hook runner.
#[derive(Debug, Clone, PartialEq)]
pub struct HookRequest {
    pub phase: HookPhase,
    /// argv; the first element is the program.
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    pub variables: VariableMap,
    pub timeout: Duration,
}

/// Message returned by the hook runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookResult {
    pub phase: HookPhase,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl HookResult {
    /// One-line description of a failure.
    pub fn failure_reason(&self) -> String {
        if self.timed_out {
            return format!("timed out after {:.1}s", self.duration.as_secs_f64());
        }
        let code = self
            .exit_code
            .map_or_else(|| "signal".to_string(), |c| format!("exit code {c}"));
        let detail = self.stderr.lines().last().unwrap_or("").trim();
        if detail.is_empty() {
            code
        } else {
            format!("{code}: {detail}")
        }
    }
}

/// Port for running template hooks in an isolated child process.
///
/// Implemented by:
/// - `kiln_adapters::hooks::ProcessHookRunner`
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait HookRunner: Send + Sync {
    /// Run one hook. A hook that fails or times out is reported through
    /// `HookResult`, not as an error; errors mean the hook could not be
    /// started at all.
    fn run(&self, request: &HookRequest) -> KilnResult<HookResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPhase {
    /// Before publish; findings are errors.
    Syntax,
    /// After publish; findings are warnings.
    Lint,
}

#[derive(Debug, Clone)]
pub struct QualityRequest {
    pub dir: PathBuf,
    pub phase: QualityPhase,
    pub checks: Vec<QualityCheckSpec>,
    /// Files to inspect, relative to `dir`.
    pub files: Vec<RelativePath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityFinding {
    pub check: String,
    pub path: Option<RelativePath>,
    pub message: String,
}

impl std::fmt::Display for QualityFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "[{}] {}: {}", self.check, path, self.message),
            None => write!(f, "[{}] {}", self.check, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub errors: Vec<QualityFinding>,
    pub warnings: Vec<QualityFinding>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn merge(&mut self, other: QualityReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Port for checking generated output.
///
/// Implemented by:
/// - `kiln_adapters::quality::StandardQualityGate`
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait QualityGate: Send + Sync {
    fn check(&self, request: &QualityRequest) -> KilnResult<QualityReport>;
}

/// Port for asking the user for a variable value.
///
/// Implemented by the CLI with `dialoguer`.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait Prompter: Send + Sync {
    /// Ask for `definition`, pre-filling `suggested` when present.
    fn prompt(
        &self,
        definition: &VariableDefinition,
        suggested: Option<VariableValue>,
    ) -> KilnResult<VariableValue>;
}
