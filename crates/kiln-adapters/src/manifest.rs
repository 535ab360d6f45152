//! `template.toml` manifest types.
//!
//! # Format
//!
//! ```toml
//! [template]
//! name        = "rust-service"      # ^[a-z0-9][a-z0-9._-]*$
//! version     = "1.2.0"             # semver
//! description = "Axum service"      # optional
//!
//! [files]                           # optional
//! content_dir = "template"          # default
//! exclude     = ["**/.DS_Store"]
//! copy_only   = ["assets/**"]       # never rendered, copied byte-for-byte
//!
//! [[variables]]
//! name     = "db"
//! type     = "choice"               # string | int | bool | choice
//! choices  = ["postgres", "sqlite"]
//! default  = "postgres"
//! required = false
//! pattern  = "^[a-z]+$"             # optional
//! prompt   = "Database"             # optional
//!
//! [hooks]
//! pre_generate  = ["sh", "hooks/check.sh"]
//! post_generate = ["git", "init"]
//! timeout_secs  = 60
//!
//! [[quality]]
//! name    = "cargo-check"
//! command = ["cargo", "check", "--quiet"]
//! kind    = "lint"                  # syntax | lint
//!
//! [[modules]]
//! type      = "handler"
//! path      = "modules/handler"     # default: modules/<type>
//! singleton = false
//!
//! [[modules.dependencies]]
//! file  = "Cargo.toml"
//! lines = ["{{ module_name }}-client = \"1\""]
//!
//! [[modules.imports]]
//! file   = "src/main.rs"
//! anchor = "// kiln:modules"
//! line   = "mod {{ module_name }};"
//! ```

use std::time::Duration;

use serde::Deserialize;

use kiln_core::domain::{
    DomainError, HookSpecs, QualityCheckSpec, QualityKind, VariableDefinition, VariableType,
    VariableValue,
};

pub const MANIFEST_FILE: &str = "template.toml";

/// Deserialised representation of a `template.toml` file.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TemplateManifest {
    pub template: TemplateSection,
    #[serde(default)]
    pub files: FilesSection,
    #[serde(default)]
    pub variables: Vec<VariableEntry>,
    #[serde(default)]
    pub hooks: HooksSection,
    #[serde(default)]
    pub quality: Vec<QualityEntry>,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
}

/// `[template]` section: identity of the template.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TemplateSection {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

/// `[files]` section: where the project tree lives and how it is treated.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct FilesSection {
    pub content_dir: String,
    pub exclude: Vec<String>,
    pub copy_only: Vec<String>,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            content_dir: "template".into(),
            exclude: Vec::new(),
            copy_only: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    #[default]
    String,
    Int,
    Bool,
    Choice,
}

/// One entry under `[[variables]]` or `[[modules.variables]]`.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct VariableEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: VariableKind,
    #[serde(default)]
    pub required: bool,
    pub default: Option<toml::Value>,
    pub pattern: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
    pub description: Option<String>,
    pub prompt: Option<String>,
}

impl VariableEntry {
    pub fn to_definition(&self) -> Result<VariableDefinition, DomainError> {
        let invalid = |reason: String| DomainError::InvalidVariableDefinition {
            name: self.name.clone(),
            reason,
        };

        let kind = match self.kind {
            VariableKind::String => VariableType::String,
            VariableKind::Int => VariableType::Int,
            VariableKind::Bool => VariableType::Bool,
            VariableKind::Choice => VariableType::Choice(self.choices.clone()),
        };
        if !self.choices.is_empty() && self.kind != VariableKind::Choice {
            return Err(invalid("'choices' is only allowed with type = \"choice\"".into()));
        }

        let mut def = VariableDefinition::new(self.name.clone(), kind);
        def.required = self.required;
        def.description = self.description.clone();
        def.prompt = self.prompt.clone();
        if let Some(default) = &self.default {
            def.default = Some(match default {
                toml::Value::String(s) => VariableValue::String(s.clone()),
                toml::Value::Integer(i) => VariableValue::Int(*i),
                toml::Value::Boolean(b) => VariableValue::Bool(*b),
                other => {
                    return Err(invalid(format!(
                        "default must be a string, integer or boolean, got {}",
                        other.type_str()
                    )));
                }
            });
        }
        if let Some(pattern) = &self.pattern {
            def = def.with_pattern(pattern)?;
        }
        def.check()?;
        Ok(def)
    }
}

/// `[hooks]` section.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct HooksSection {
    pub pre_generate: Option<Vec<String>>,
    pub post_generate: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

impl HooksSection {
    pub fn to_specs(&self) -> Result<HookSpecs, DomainError> {
        for (phase, argv) in [
            ("pre_generate", &self.pre_generate),
            ("post_generate", &self.post_generate),
        ] {
            if argv.as_ref().is_some_and(|a| a.is_empty()) {
                return Err(invalid_manifest(format!("hooks.{phase} must not be empty")));
            }
        }
        Ok(HookSpecs {
            pre_generate: self.pre_generate.clone(),
            post_generate: self.post_generate.clone(),
            timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(HookSpecs::default().timeout),
        })
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityKindEntry {
    Syntax,
    #[default]
    Lint,
}

/// One entry under `[[quality]]`.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct QualityEntry {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub kind: QualityKindEntry,
}

impl QualityEntry {
    pub fn to_spec(&self) -> Result<QualityCheckSpec, DomainError> {
        if self.command.is_empty() {
            return Err(invalid_manifest(format!(
                "quality check '{}' has an empty command",
                self.name
            )));
        }
        Ok(QualityCheckSpec {
            name: self.name.clone(),
            command: self.command.clone(),
            kind: match self.kind {
                QualityKindEntry::Syntax => QualityKind::Syntax,
                QualityKindEntry::Lint => QualityKind::Lint,
            },
        })
    }
}

/// One entry under `[[modules]]`.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ModuleEntry {
    #[serde(rename = "type")]
    pub module_type: String,
    pub description: Option<String>,
    /// Module tree, relative to the template root.
    pub path: Option<String>,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub variables: Vec<VariableEntry>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
    #[serde(default)]
    pub imports: Vec<ImportEntry>,
}

impl ModuleEntry {
    pub fn content_dir(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("modules/{}", self.module_type))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DependencyEntry {
    pub file: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ImportEntry {
    pub file: String,
    pub anchor: String,
    pub line: String,
}

impl TemplateManifest {
    pub fn parse(text: &str) -> Result<Self, DomainError> {
        toml::from_str(text).map_err(|e| invalid_manifest(e.to_string()))
    }
}

fn invalid_manifest(reason: String) -> DomainError {
    DomainError::ManifestInvalid {
        path: MANIFEST_FILE.into(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[template]
name = "rust-service"
version = "1.2.0"

[files]
copy_only = ["assets/**"]

[[variables]]
name = "db"
type = "choice"
choices = ["postgres", "sqlite"]
default = "postgres"

[[variables]]
name = "port"
type = "int"
default = 8080

[hooks]
pre_generate = ["sh", "hooks/check.sh"]
timeout_secs = 5

[[quality]]
name = "fmt"
command = ["cargo", "fmt", "--check"]

[[modules]]
type = "handler"

[[modules.imports]]
file = "src/main.rs"
anchor = "// kiln:modules"
line = "mod {{ module_name }};"
"#;

    #[test]
    fn parses_every_section() {
        let manifest = TemplateManifest::parse(FULL).unwrap();
        assert_eq!(manifest.template.name, "rust-service");
        assert_eq!(manifest.files.content_dir, "template");
        assert_eq!(manifest.files.copy_only, vec!["assets/**"]);
        assert_eq!(manifest.variables.len(), 2);
        assert_eq!(manifest.modules[0].content_dir(), "modules/handler");
        assert_eq!(manifest.quality[0].kind, QualityKindEntry::Lint);

        let hooks = manifest.hooks.to_specs().unwrap();
        assert_eq!(hooks.timeout, Duration::from_secs(5));
        assert!(hooks.post_generate.is_none());
    }

    #[test]
    fn converts_variables() {
        let manifest = TemplateManifest::parse(FULL).unwrap();
        let db = manifest.variables[0].to_definition().unwrap();
        assert_eq!(
            db.kind,
            VariableType::Choice(vec!["postgres".into(), "sqlite".into()])
        );
        assert_eq!(db.default, Some(VariableValue::from("postgres")));

        let port = manifest.variables[1].to_definition().unwrap();
        assert_eq!(port.default, Some(VariableValue::Int(8080)));
    }

    #[test]
    fn rejects_bad_choice_default() {
        let entry = VariableEntry {
            name: "db".into(),
            kind: VariableKind::Choice,
            required: false,
            default: Some(toml::Value::String("mysql".into())),
            pattern: None,
            choices: vec!["postgres".into(), "sqlite".into()],
            description: None,
            prompt: None,
        };
        assert!(matches!(
            entry.to_definition(),
            Err(DomainError::InvalidVariableDefinition { .. })
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = TemplateManifest::parse(
            "[template]\nname = \"x\"\nversion = \"1.0.0\"\ncolour = \"red\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::ManifestInvalid { .. }));
    }

    #[test]
    fn empty_hook_is_rejected() {
        let hooks = HooksSection {
            pre_generate: Some(Vec::new()),
            ..HooksSection::default()
        };
        assert!(hooks.to_specs().is_err());
    }
}
