// ============================================================================
// domain/error.rs - DOMAIN ERRORS
// ============================================================================

use thiserror::Error;

/// Root domain error type.
///
/// All errors are:
/// - Cloneable (results are shared between parallel render workers)
/// - Categorizable (for CLI display and exit codes)
/// - Actionable (provides suggestions)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    // ========================================================================
    // Input Errors (bad names, bad values)
    // ========================================================================
    #[error("invalid project name '{name}': {reason}")]
    InvalidProjectName { name: String, reason: String },

    #[error("invalid module name '{name}': {reason}")]
    InvalidModuleName { name: String, reason: String },

    #[error("invalid template identifier '{value}': {reason}")]
    InvalidTemplateId { value: String, reason: String },

    #[error("missing required variable '{name}'")]
    MissingRequiredVariable { name: String },

    #[error("validation failed for variable '{name}': {reason}")]
    ValidationFailed { name: String, reason: String },

    #[error("invalid variable definition '{name}': {reason}")]
    InvalidVariableDefinition { name: String, reason: String },

    #[error("Absolute paths not allowed: {path}")]
    AbsolutePathNotAllowed { path: String },

    #[error("path escapes the project root: {path}")]
    PathEscapesRoot { path: String },

    #[error("Duplicate path in rendered output: {path}")]
    DuplicatePath { path: String },

    // ========================================================================
    // Source Errors (manifest, syntax, size)
    // ========================================================================
    #[error("invalid manifest {path}: {reason}")]
    ManifestInvalid { path: String, reason: String },

    #[error("template is {size} bytes, over the {limit} byte limit")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("{path}:{line}:{column}: {message}")]
    TemplateSyntax {
        path: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{path} references undeclared variable(s): {}", names.join(", "))]
    UndeclaredVariable { path: String, names: Vec<String> },

    #[error("failed to render {path}: {reason}")]
    RenderFailed { path: String, reason: String },

    // ========================================================================
    // Merge / State Errors
    // ========================================================================
    #[error("illegal update state transition for {path}: {from} -> {to}")]
    IllegalTransition {
        path: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("metadata is corrupt: {reason}")]
    MetadataCorrupt { reason: String },
}

impl DomainError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidProjectName { .. } => vec![
                "Use lowercase letters, digits, '-' and '_'".into(),
                "Start with a letter".into(),
            ],
            Self::InvalidModuleName { .. } => vec![
                "Module names must be identifier-safe (e.g. 'billing_api')".into(),
            ],
            Self::MissingRequiredVariable { name } => vec![
                format!("Pass a value with -d {name}=<value>"),
                "Or run interactively to be prompted".into(),
            ],
            Self::ValidationFailed { name, .. } => vec![
                format!("Check the value given for '{name}'"),
                "See the template's template.toml for the allowed values".into(),
            ],
            Self::SizeExceeded { .. } => vec![
                "Templates are limited to 100 MB".into(),
                "Move large assets out of the template or exclude them in [files]".into(),
            ],
            Self::TemplateSyntax { path, line, .. } => vec![
                format!("Fix the template syntax in {path} near line {line}"),
                "Literal braces can be wrapped in {% raw %}...{% endraw %}".into(),
            ],
            Self::UndeclaredVariable { names, .. } => vec![
                format!("Declare {} in [[variables]]", names.join(", ")),
            ],
            Self::ManifestInvalid { path, .. } => vec![
                format!("Check the TOML in {path}"),
            ],
            Self::MetadataCorrupt { .. } => vec![
                "The project's .kiln-answers.json could not be understood".into(),
                "Restore it from version control".into(),
            ],
            _ => vec!["See documentation for more details".into()],
        }
    }

    /// Error category for CLI display styling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidProjectName { .. }
            | Self::InvalidModuleName { .. }
            | Self::InvalidTemplateId { .. }
            | Self::MissingRequiredVariable { .. }
            | Self::ValidationFailed { .. }
            | Self::AbsolutePathNotAllowed { .. }
            | Self::PathEscapesRoot { .. } => ErrorCategory::Input,
            Self::ManifestInvalid { .. }
            | Self::SizeExceeded { .. }
            | Self::TemplateSyntax { .. }
            | Self::UndeclaredVariable { .. }
            | Self::InvalidVariableDefinition { .. }
            | Self::DuplicatePath { .. }
            | Self::RenderFailed { .. } => ErrorCategory::Source,
            Self::IllegalTransition { .. } | Self::MetadataCorrupt { .. } => ErrorCategory::Merge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Source,
    Merge,
}
