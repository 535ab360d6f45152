//! Template variables: declarations, values, and validation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Resolved variables, ordered so serialized metadata is deterministic.
pub type VariableMap = BTreeMap<String, VariableValue>;

/// A concrete variable value. Choice values are strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl VariableValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used by `{% if %}`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::String(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for VariableValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for VariableValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for VariableValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Declared type of a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableType {
    String,
    Int,
    Bool,
    /// One of a fixed set of strings; at least two must be declared.
    Choice(Vec<String>),
}

impl VariableType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Choice(_) => "choice",
        }
    }
}

/// Compiled validation pattern; equality compares the source text.
#[derive(Debug, Clone)]
pub struct ValuePattern {
    source: String,
    regex: Regex,
}

impl ValuePattern {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for ValuePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// One entry of a template's `[[variables]]` table.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub kind: VariableType,
    pub required: bool,
    /// String defaults may contain template expressions over earlier variables.
    pub default: Option<VariableValue>,
    pub pattern: Option<ValuePattern>,
    pub description: Option<String>,
    pub prompt: Option<String>,
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

/// `true` for names usable as template variables and module names.
pub fn is_identifier(name: &str) -> bool {
    identifier_regex().is_match(name)
}

impl VariableDefinition {
    pub fn new(name: impl Into<String>, kind: VariableType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            pattern: None,
            description: None,
            prompt: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<VariableValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a validation regex.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, DomainError> {
        let regex = Regex::new(pattern).map_err(|e| DomainError::InvalidVariableDefinition {
            name: self.name.clone(),
            reason: format!("invalid pattern '{pattern}': {e}"),
        })?;
        self.pattern = Some(ValuePattern {
            source: pattern.to_string(),
            regex,
        });
        Ok(self)
    }

    /// Text shown when prompting.
    pub fn prompt_text(&self) -> &str {
        self.prompt
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or(&self.name)
    }

    /// `true` when the default must be rendered against earlier answers.
    pub fn has_templated_default(&self) -> bool {
        matches!(&self.default, Some(VariableValue::String(s)) if s.contains("{{") || s.contains("{%"))
    }

    /// Check the declaration itself.
    pub fn check(&self) -> Result<(), DomainError> {
        if !is_identifier(&self.name) {
            return Err(DomainError::InvalidVariableDefinition {
                name: self.name.clone(),
                reason: "name must be identifier-safe".into(),
            });
        }

        if let VariableType::Choice(choices) = &self.kind {
            if choices.len() < 2 {
                return Err(DomainError::InvalidVariableDefinition {
                    name: self.name.clone(),
                    reason: format!("choice declares {} option(s), needs at least 2", choices.len()),
                });
            }
        }

        // Templated defaults are checked once rendered.
        if let Some(default) = &self.default {
            if !self.has_templated_default() {
                self.validate(default)
                    .map_err(|e| DomainError::InvalidVariableDefinition {
                        name: self.name.clone(),
                        reason: format!("default is invalid: {e}"),
                    })?;
            }
        }
        Ok(())
    }

    /// Coerce a raw value to the declared type and check every constraint.
    pub fn validate(&self, raw: &VariableValue) -> Result<VariableValue, DomainError> {
        let fail = |reason: String| DomainError::ValidationFailed {
            name: self.name.clone(),
            reason,
        };

        let value = match (&self.kind, raw) {
            (VariableType::String, v) => VariableValue::String(v.to_string()),
            (VariableType::Int, VariableValue::Int(i)) => VariableValue::Int(*i),
            (VariableType::Int, VariableValue::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(VariableValue::Int)
                .map_err(|_| fail(format!("'{s}' is not an integer")))?,
            (VariableType::Int, VariableValue::Bool(_)) => {
                return Err(fail("expected an integer, got a boolean".into()));
            }
            (VariableType::Bool, VariableValue::Bool(b)) => VariableValue::Bool(*b),
            (VariableType::Bool, VariableValue::String(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "y" | "1" | "on" => VariableValue::Bool(true),
                    "false" | "no" | "n" | "0" | "off" => VariableValue::Bool(false),
                    _ => return Err(fail(format!("'{s}' is not a boolean"))),
                }
            }
            (VariableType::Bool, VariableValue::Int(_)) => {
                return Err(fail("expected a boolean, got an integer".into()));
            }
            (VariableType::Choice(choices), v) => {
                let s = v.to_string();
                if !choices.iter().any(|c| *c == s) {
                    return Err(fail(format!(
                        "'{s}' is not one of: {}",
                        choices.join(", ")
                    )));
                }
                VariableValue::String(s)
            }
        };

        if let Some(pattern) = &self.pattern {
            if !matches!(value, VariableValue::Bool(_)) {
                let text = value.to_string();
                if !pattern.is_match(&text) {
                    return Err(fail(format!(
                        "'{text}' does not match pattern {}",
                        pattern.as_str()
                    )));
                }
            }
        }

        Ok(value)
    }
}
