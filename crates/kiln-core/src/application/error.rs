//! Application layer errors.
//!
//! These errors represent failures in orchestration, not business logic.
//! Business logic errors are `DomainError` from `crate::domain`.

use std::path::PathBuf;
use thiserror::Error;

use crate::error::ErrorCategory;

/// Errors that occur during application orchestration.
#[derive(Debug, Error, Clone)]
pub enum ApplicationError {
    /// Template source could not be reached and nothing usable is cached.
    #[error("template source unavailable: {source_desc}: {reason}")]
    SourceUnavailable { source_desc: String, reason: String },

    /// No template with this identifier is known to the store.
    #[error("unknown template: {reference}")]
    UnknownTemplate { reference: String },

    /// Target directory is not empty and the overwrite mode forbids writing.
    #[error("destination {path} is not empty")]
    DestinationConflict { path: PathBuf },

    /// Publish failed part-way and the target was restored.
    #[error("write to {path} failed and was rolled back: {reason}")]
    PartialWriteRecovered { path: PathBuf, reason: String },

    /// Filesystem operation failed.
    #[error("Filesystem error at {path}: {reason}")]
    FilesystemError { path: PathBuf, reason: String },

    /// Pre-generation hook failed or timed out.
    #[error("{phase} hook failed: {reason}")]
    HookFailed { phase: String, reason: String },

    /// Generated output failed a blocking quality check.
    #[error("generated output failed {count} syntax check(s): {summary}")]
    QualityFailed { count: usize, summary: String },

    /// Operation was interrupted by the user.
    #[error("operation cancelled")]
    Cancelled,

    /// Project directory carries no generation metadata.
    #[error("no generation metadata found in {path}")]
    MetadataMissing { path: PathBuf },

    /// The template declares no module of this type.
    #[error("template {template} has no module type '{module_type}'")]
    UnknownModule {
        template: String,
        module_type: String,
        available: Vec<String>,
    },

    /// Module is already present or cannot be added.
    #[error("module conflict: {reason}")]
    ModuleConflict { reason: String },

    /// Store access failed (lock poisoned, etc.).
    #[error("Template store error")]
    StoreLockError,

    /// Rollback failed (best-effort cleanup failed).
    #[error("Rollback failed for {path}: {reason}")]
    RollbackFailed { path: PathBuf, reason: String },

    /// A required port was not supplied to the service.
    #[error("Required adapter not configured: {name}")]
    AdapterNotConfigured { name: &'static str },
}

impl ApplicationError {
    /// Get user-actionable suggestions.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::SourceUnavailable { .. } => vec![
                "Check your network connection or the source URL".into(),
                "Previously used templates keep working from the cache".into(),
            ],
            Self::UnknownTemplate { reference } => vec![
                format!("'{reference}' is neither a directory nor a cached template"),
                "Try: kiln templates list".into(),
            ],
            Self::DestinationConflict { path } => vec![
                format!("Directory is not empty: {}", path.display()),
                "Use --overwrite skip-existing|overwrite|merge".into(),
                "Or choose a different output directory".into(),
            ],
            Self::PartialWriteRecovered { path, .. } => vec![
                format!("{} was restored to its previous state", path.display()),
                "Check permissions and free disk space, then retry".into(),
            ],
            Self::FilesystemError { path, .. } => vec![
                format!("Failed to access: {}", path.display()),
                "Check that you have write permissions".into(),
            ],
            Self::HookFailed { .. } => vec![
                "Inspect the hook output above".into(),
                "Hooks run with a restricted environment: only PATH, HOME and LANG".into(),
            ],
            Self::QualityFailed { .. } => vec![
                "A template rendered invalid syntax; this is a template bug".into(),
                "Re-run with -vv to see each finding".into(),
            ],
            Self::Cancelled => vec![
                "Operation was cancelled".into(),
                "No changes were made".into(),
            ],
            Self::MetadataMissing { .. } => vec![
                "Run this command inside a project created by kiln".into(),
                "Or pass the project directory with -p".into(),
            ],
            Self::UnknownModule { available, .. } if available.is_empty() => {
                vec!["This template does not declare any modules".into()]
            }
            Self::UnknownModule { available, .. } => {
                vec![format!("Available module types: {}", available.join(", "))]
            }
            Self::ModuleConflict { .. } => vec![
                "Pick a different module name".into(),
            ],
            Self::StoreLockError => vec![
                "The template store is locked".into(),
                "Try again in a moment".into(),
            ],
            _ => vec!["Check the error details above".into()],
        }
    }

    /// Get error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SourceUnavailable { .. } | Self::UnknownTemplate { .. } => ErrorCategory::Source,
            Self::DestinationConflict { .. }
            | Self::PartialWriteRecovered { .. }
            | Self::FilesystemError { .. }
            | Self::RollbackFailed { .. } => ErrorCategory::Write,
            Self::HookFailed { .. } | Self::QualityFailed { .. } => ErrorCategory::Quality,
            Self::Cancelled | Self::ModuleConflict { .. } | Self::UnknownModule { .. } => {
                ErrorCategory::Input
            }
            Self::MetadataMissing { .. } => ErrorCategory::Merge,
            Self::StoreLockError => ErrorCategory::Internal,
            Self::AdapterNotConfigured { .. } => ErrorCategory::Configuration,
        }
    }
}
