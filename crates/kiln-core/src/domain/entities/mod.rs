pub mod cache;
pub mod common;
pub mod project;
pub mod project_structure;
pub mod template;
pub mod variable;

pub use crate::domain::DomainError;
pub use cache::{CacheEntry, SourceDescriptor, TemplateRef};
pub use common::{Permissions, RelativePath};
pub use project::{
    METADATA_FILE, METADATA_FORMAT, ModuleRecord, ProjectMetadata, TemplateLineage, content_hash,
};
pub use project_structure::{FileContent, FileToWrite, ProjectStructure};
pub use template::{
    DependencyEdit, FileKind, HookSpecs, ImportEdit, MAX_TEMPLATE_SIZE, ModuleSpec,
    QualityCheckSpec, QualityKind, Template, TemplateFile, TemplateId, TemplateSummary,
    WARN_TEMPLATE_SIZE, check_size, validate_template_name,
};
pub use variable::{
    ValuePattern, VariableDefinition, VariableMap, VariableType, VariableValue, is_identifier,
};
