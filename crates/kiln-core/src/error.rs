//! Unified error handling for Kiln Core.
//!
//! This module provides a unified error type that wraps domain and application
//! errors, with a machine-readable kind and user-actionable suggestions.

use serde::Serialize;
use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::DomainError;

/// Root error type for Kiln Core operations.
#[derive(Debug, Error, Clone)]
pub enum KilnError {
    /// Errors from the domain layer (validation, syntax, merge state).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Errors from the application layer (orchestration failures).
    #[error(transparent)]
    Application(#[from] ApplicationError),

    /// Configuration or setup errors.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unexpected internal errors (bugs).
    #[error("Internal error: {message}. This is a bug, please report it.")]
    Internal { message: String },
}

impl KilnError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Domain(e) => e.suggestions(),
            Self::Application(e) => e.suggestions(),
            Self::Configuration { message } => vec![
                format!("Configuration issue: {}", message),
                "Check your setup and try again".into(),
            ],
            Self::Internal { .. } => vec!["This appears to be a bug in Kiln".into()],
        }
    }

    /// Get error category for display/styling purposes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Domain(e) => match e.category() {
                crate::domain::ErrorCategory::Input => ErrorCategory::Input,
                crate::domain::ErrorCategory::Source => ErrorCategory::Source,
                crate::domain::ErrorCategory::Merge => ErrorCategory::Merge,
            },
            Self::Application(e) => e.category(),
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Machine-readable error kind, stable across releases.
    pub fn kind(&self) -> ErrorKind {
        use ApplicationError as A;
        use DomainError as D;

        match self {
            Self::Domain(e) => match e {
                D::InvalidProjectName { .. } => ErrorKind::InvalidProjectName,
                D::InvalidModuleName { .. } => ErrorKind::InvalidModuleName,
                D::InvalidTemplateId { .. } => ErrorKind::UnknownTemplate,
                D::MissingRequiredVariable { .. } => ErrorKind::MissingRequiredVariable,
                D::ValidationFailed { .. } => ErrorKind::ValidationFailed,
                D::AbsolutePathNotAllowed { .. } | D::PathEscapesRoot { .. } => {
                    ErrorKind::InvalidPath
                }
                D::ManifestInvalid { .. } | D::InvalidVariableDefinition { .. } => {
                    ErrorKind::ManifestInvalid
                }
                D::SizeExceeded { .. } => ErrorKind::SizeExceeded,
                D::TemplateSyntax { .. } | D::RenderFailed { .. } | D::DuplicatePath { .. } => {
                    ErrorKind::TemplateSyntaxError
                }
                D::UndeclaredVariable { .. } => ErrorKind::UndeclaredVariable,
                D::IllegalTransition { .. } => ErrorKind::Internal,
                D::MetadataCorrupt { .. } => ErrorKind::MetadataMissing,
            },
            Self::Application(e) => match e {
                A::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
                A::UnknownTemplate { .. } => ErrorKind::UnknownTemplate,
                A::DestinationConflict { .. } => ErrorKind::DestinationConflict,
                A::PartialWriteRecovered { .. } => ErrorKind::PartialWriteRecovered,
                A::RollbackFailed { .. } | A::FilesystemError { .. } => ErrorKind::WriteFailed,
                A::HookFailed { .. } => ErrorKind::HookFailed,
                A::QualityFailed { .. } => ErrorKind::QualityFailed,
                A::Cancelled => ErrorKind::Cancelled,
                A::MetadataMissing { .. } => ErrorKind::MetadataMissing,
                A::ModuleConflict { .. } => ErrorKind::ModuleConflict,
                A::UnknownModule { .. } => ErrorKind::UnknownModule,
                A::StoreLockError | A::AdapterNotConfigured { .. } => ErrorKind::Internal,
            },
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Application(ApplicationError::StoreLockError)
                | Self::Application(ApplicationError::SourceUnavailable { .. })
        )
    }
}

/// Error categories, following the engine's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad names or values; nothing was started.
    Input,
    /// Template unreachable, malformed, or too large.
    Source,
    /// Publishing failed; target left unchanged.
    Write,
    /// Generated output failed a blocking check.
    Quality,
    /// Update could not be reconciled.
    Merge,
    Configuration,
    Internal,
}

/// Machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidProjectName,
    InvalidModuleName,
    InvalidPath,
    MissingRequiredVariable,
    ValidationFailed,
    UnknownTemplate,
    SourceUnavailable,
    ManifestInvalid,
    TemplateSyntaxError,
    UndeclaredVariable,
    SizeExceeded,
    DestinationConflict,
    PartialWriteRecovered,
    WriteFailed,
    HookFailed,
    QualityFailed,
    Cancelled,
    MetadataMissing,
    ModuleConflict,
    UnknownModule,
    Configuration,
    Internal,
}

/// Convenient result type alias.
pub type KilnResult<T> = Result<T, KilnError>;
