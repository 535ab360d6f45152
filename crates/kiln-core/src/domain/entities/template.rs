//! Template aggregate.
//!
//! ```text
//! Template (held behind Arc, immutable once loaded)
//! ├── TemplateId            name@version
//! ├── VariableDefinition[]  declaration order preserved
//! ├── TemplateFile[]        compiled path + compiled body (or binary source)
//! ├── HookSpecs             pre/post generate argv, timeout
//! ├── QualityCheckSpec[]    external syntax / lint commands
//! └── ModuleSpec[]          add-on trees for `add_module`
//! ```
//!
//! A newer version of a template is a new `Template`; nothing here is ever
//! mutated after the loader builds it.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use semver::Version;
use serde::Serialize;

use super::cache::SourceDescriptor;
use super::common::{Permissions, RelativePath};
use super::project_structure::{FileContent, FileToWrite};
use super::variable::{VariableDefinition, VariableMap};
use crate::domain::{DomainError, lang::Program};

/// Hard upper bound on the total size of a template tree.
pub const MAX_TEMPLATE_SIZE: u64 = 100_000_000;
/// Templates larger than this load with a warning.
pub const WARN_TEMPLATE_SIZE: u64 = 50_000_000;

/// Default hook timeout when the manifest sets none.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(60);

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("static regex"))
}

/// Check a template name: lowercase, digits, `.`, `_`, `-`; no `@`.
pub fn validate_template_name(name: &str) -> Result<(), DomainError> {
    if name_regex().is_match(name) {
        Ok(())
    } else {
        Err(DomainError::InvalidTemplateId {
            value: name.to_string(),
            reason: "name must match ^[a-z0-9][a-z0-9._-]*$".into(),
        })
    }
}

/// Enforce the size limits. Returns a warning for large but legal templates.
pub fn check_size(size: u64) -> Result<Option<String>, DomainError> {
    if size > MAX_TEMPLATE_SIZE {
        return Err(DomainError::SizeExceeded {
            size,
            limit: MAX_TEMPLATE_SIZE,
        });
    }
    if size > WARN_TEMPLATE_SIZE {
        return Ok(Some(format!(
            "template is {size} bytes; templates over {WARN_TEMPLATE_SIZE} bytes are slow to load"
        )));
    }
    Ok(None)
}

/// Template identity: `name@version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId {
    name: String,
    version: Version,
}

impl TemplateId {
    pub fn new(name: impl Into<String>, version: Version) -> Result<Self, DomainError> {
        let name = name.into();
        validate_template_name(&name)?;
        Ok(Self { name, version })
    }

    /// Parse `name@version`.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let invalid = |reason: String| DomainError::InvalidTemplateId {
            value: s.to_string(),
            reason,
        };
        let (name, version) = s
            .split_once('@')
            .ok_or_else(|| invalid("expected 'name@version'".into()))?;
        let version =
            Version::parse(version).map_err(|e| invalid(format!("bad version: {e}")))?;
        Self::new(name, version)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl Serialize for TemplateId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How a file's bytes are produced.
#[derive(Debug, Clone)]
pub enum FileKind {
    /// Rendered through the template language.
    Text(Program),
    /// Copied byte-for-byte from the template tree.
    Binary { source: PathBuf },
}

/// One file of a template or module tree.
#[derive(Debug, Clone)]
pub struct TemplateFile {
    /// Location inside the content directory, before path rendering.
    pub source_path: RelativePath,
    /// Output path; may contain placeholders.
    pub path: Program,
    pub kind: FileKind,
    pub permissions: Permissions,
}

impl TemplateFile {
    pub fn is_binary(&self) -> bool {
        matches!(self.kind, FileKind::Binary { .. })
    }

    /// Render the output path and body.
    ///
    /// Returns `None` when the path renders with an empty segment, which is
    /// how templates make a file conditional (`{% if docker %}Dockerfile{% endif %}`).
    pub fn render(&self, vars: &VariableMap) -> Result<Option<FileToWrite>, DomainError> {
        let rendered = self.path.render(vars);
        if rendered.is_empty() || rendered.split('/').any(|seg| seg.trim().is_empty()) {
            return Ok(None);
        }
        let path = RelativePath::try_new(&rendered)?;
        let content = match &self.kind {
            FileKind::Text(program) => FileContent::Text(program.render(vars)),
            FileKind::Binary { source } => FileContent::Copy(source.clone()),
        };
        Ok(Some(FileToWrite {
            path,
            content,
            permissions: self.permissions,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSpecs {
    pub pre_generate: Option<Vec<String>>,
    pub post_generate: Option<Vec<String>>,
    pub timeout: Duration,
}

impl Default for HookSpecs {
    fn default() -> Self {
        Self {
            pre_generate: None,
            post_generate: None,
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityKind {
    /// Failure blocks publishing.
    Syntax,
    /// Failure is reported as a warning.
    Lint,
}

/// A manifest `[[quality]]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityCheckSpec {
    pub name: String,
    pub command: Vec<String>,
    pub kind: QualityKind,
}

/// Lines appended to a dependency file when a module is added.
#[derive(Debug, Clone)]
pub struct DependencyEdit {
    pub file: Program,
    pub lines: Vec<Program>,
}

/// A line inserted after `anchor` when a module is added.
#[derive(Debug, Clone)]
pub struct ImportEdit {
    pub file: Program,
    pub anchor: String,
    pub line: Program,
}

#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub module_type: String,
    pub description: Option<String>,
    pub files: Vec<TemplateFile>,
    pub variables: Vec<VariableDefinition>,
    /// At most one instance per project.
    pub singleton: bool,
    pub dependencies: Vec<DependencyEdit>,
    pub imports: Vec<ImportEdit>,
}

/// A loaded, validated template.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: TemplateId,
    pub description: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub exclude: Vec<String>,
    pub copy_only: Vec<String>,
    pub size: u64,
    pub source: SourceDescriptor,
    pub root: PathBuf,
    pub files: Vec<TemplateFile>,
    pub hooks: HookSpecs,
    pub quality: Vec<QualityCheckSpec>,
    pub modules: Vec<ModuleSpec>,
}

impl Template {
    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn module(&self, module_type: &str) -> Option<&ModuleSpec> {
        self.modules.iter().find(|m| m.module_type == module_type)
    }

    /// Check the invariants the loader relies on.
    pub fn validate(&self) -> Result<(), DomainError> {
        check_size(self.size)?;

        let mut seen = std::collections::HashSet::new();
        for def in &self.variables {
            def.check()?;
            if !seen.insert(def.name.as_str()) {
                return Err(DomainError::InvalidVariableDefinition {
                    name: def.name.clone(),
                    reason: "declared twice".into(),
                });
            }
        }

        let mut types = std::collections::HashSet::new();
        for module in &self.modules {
            if !types.insert(module.module_type.as_str()) {
                return Err(DomainError::ManifestInvalid {
                    path: "template.toml".into(),
                    reason: format!("module '{}' declared twice", module.module_type),
                });
            }
            for def in &module.variables {
                def.check()?;
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            name: self.id.name().to_string(),
            version: self.id.version().clone(),
            description: self.description.clone(),
            source: self.source.clone(),
            modules: self.modules.iter().map(|m| m.module_type.clone()).collect(),
        }
    }
}

/// Listing entry for a cached template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    pub name: String,
    pub version: Version,
    pub description: Option<String>,
    pub source: SourceDescriptor,
    pub modules: Vec<String>,
}
