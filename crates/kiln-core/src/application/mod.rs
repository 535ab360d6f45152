//! Application layer for Kiln.
//!
//! This layer contains:
//! - **Services**: Use case orchestration (ScaffoldService, TemplateService)
//! - **Ports**: Interface definitions (traits) for external dependencies
//! - **Atomic writes**: Staging and publishing of a rendered tree
//! - **Errors**: Application-specific error types
//!
//! Template syntax, merge rules and validation live in `crate::domain`;
//! this layer decides in which order they run and what touches disk.

pub mod atomic;
pub mod cancel;
pub mod error;
pub mod ports;
pub mod results;
pub mod services;
pub mod variables;

#[cfg(test)]
pub(crate) mod test_support;

pub use services::{MODULE_NAME_VARIABLE, ScaffoldService, TemplateService};

// Re-export port traits (for adapter implementation)
pub use ports::{
    Filesystem, HookRunner, Prompter, QualityGate, TemplateRenderer, TemplateStore,
};

pub use atomic::{AtomicWriter, OverwriteMode, PublishReport, Staging};
pub use cancel::CancellationToken;
pub use error::ApplicationError;
pub use results::{
    FileConflicts, GenerateOptions, GenerateRequest, GenerationResult, ModuleRequest,
    ModuleResult, Outcome, UpdateOutcome, UpdateReport, UpdateRequest, UpdateStrategy,
};
pub use variables::{Collected, VariableCollector};
