//! Generation metadata persisted inside every generated project.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::cache::SourceDescriptor;
use super::common::RelativePath;
use super::template::TemplateId;
use super::variable::VariableMap;
use crate::domain::DomainError;

/// File name of the metadata record, at the project root.
pub const METADATA_FILE: &str = ".kiln-answers.json";

/// Current metadata format version.
pub const METADATA_FORMAT: u32 = 1;

/// Hex SHA-256 of `bytes`, as stored in the file ledger.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Which template generated the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateLineage {
    pub name: String,
    pub version: Version,
    pub source: SourceDescriptor,
}

/// A module added with `add_module`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub module_type: String,
    pub name: String,
    pub template_version: Version,
    pub added_at: DateTime<Utc>,
    /// Module-level answers, `module_name` included.
    #[serde(default)]
    pub variables: VariableMap,
    pub files: Vec<RelativePath>,
}

/// Contents of `.kiln-answers.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub format: u32,
    /// Identifies the run that last wrote this record.
    pub run_id: Uuid,
    pub template: TemplateLineage,
    pub variables: VariableMap,
    /// Answers for variables the current template version no longer declares.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stale_variables: VariableMap,
    pub generated_at: DateTime<Utc>,
    /// Relative path -> SHA-256 of the bytes kiln wrote.
    pub files: BTreeMap<RelativePath, String>,
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,
}

impl ProjectMetadata {
    pub fn new(id: &TemplateId, source: SourceDescriptor, variables: VariableMap) -> Self {
        Self {
            format: METADATA_FORMAT,
            run_id: Uuid::new_v4(),
            template: TemplateLineage {
                name: id.name().to_string(),
                version: id.version().clone(),
                source,
            },
            variables,
            stale_variables: VariableMap::new(),
            generated_at: Utc::now(),
            files: BTreeMap::new(),
            modules: Vec::new(),
        }
    }

    pub fn template_id(&self) -> Result<TemplateId, DomainError> {
        TemplateId::new(self.template.name.clone(), self.template.version.clone())
    }

    pub fn record_file(&mut self, path: RelativePath, bytes: &[u8]) {
        self.files.insert(path, content_hash(bytes));
    }

    /// `true` if `bytes` differ from what kiln last wrote at `path`.
    /// Files absent from the ledger count as modified.
    pub fn is_modified(&self, path: &RelativePath, bytes: &[u8]) -> bool {
        self.files
            .get(path)
            .is_none_or(|hash| *hash != content_hash(bytes))
    }

    pub fn module(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn has_module_type(&self, module_type: &str) -> bool {
        self.modules.iter().any(|m| m.module_type == module_type)
    }

    pub fn to_json(&self) -> Result<String, DomainError> {
        serde_json::to_string_pretty(self)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| DomainError::MetadataCorrupt {
                reason: e.to_string(),
            })
    }

    pub fn from_json(text: &str) -> Result<Self, DomainError> {
        let meta: Self = serde_json::from_str(text).map_err(|e| DomainError::MetadataCorrupt {
            reason: e.to_string(),
        })?;
        if meta.format > METADATA_FORMAT {
            return Err(DomainError::MetadataCorrupt {
                reason: format!(
                    "format {} is newer than this kiln understands ({METADATA_FORMAT})",
                    meta.format
                ),
            });
        }
        Ok(meta)
    }
}
