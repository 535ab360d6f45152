//! Core domain layer for Kiln.
//!
//! Pure logic: the template language, the three-way merge, the template and
//! project model. No filesystem, network or process access happens here; all
//! of that is reached through the ports in `crate::application`.

pub mod entities;
pub mod error;
pub mod lang;
pub mod merge;

mod validation;

pub use entities::{
    CacheEntry, DependencyEdit, FileContent, FileKind, FileToWrite, HookSpecs, ImportEdit,
    MAX_TEMPLATE_SIZE, METADATA_FILE, ModuleRecord, ModuleSpec, Permissions, ProjectMetadata,
    ProjectStructure, QualityCheckSpec, QualityKind, RelativePath, SourceDescriptor, Template,
    TemplateFile, TemplateId, TemplateLineage, TemplateRef, TemplateSummary, VariableDefinition,
    VariableMap, VariableType, VariableValue, WARN_TEMPLATE_SIZE, check_size, content_hash,
    is_identifier,
};
pub use error::{DomainError, ErrorCategory};
pub use validation::DomainValidator;
