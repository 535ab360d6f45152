//! Variable collection.
//!
//! Resolves every declared variable before anything renders, so a bad answer
//! never leaves a half-written project behind.

use tracing::{debug, warn};

use crate::application::ports::Prompter;
use crate::domain::{DomainError, VariableDefinition, VariableMap, VariableValue, lang};
use crate::error::KilnResult;

/// Answers plus non-fatal notes gathered while collecting them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    pub values: VariableMap,
    pub warnings: Vec<String>,
}

/// Resolves declared variables from CLI values, recorded answers, prompts
/// and defaults, in that order of precedence.
pub struct VariableCollector<'a> {
    prompter: Option<&'a dyn Prompter>,
}

impl<'a> VariableCollector<'a> {
    pub fn new(prompter: Option<&'a dyn Prompter>) -> Self {
        Self { prompter }
    }

    /// Resolve `definitions` in declaration order.
    ///
    /// * `cli` - values given on the command line; always win
    /// * `base` - answers already recorded for this project
    /// * `interactive` - prompt for anything still unresolved
    ///
    /// The result holds `base` plus every resolved declared variable.
    /// Values in `cli` that name neither a declared nor a recorded variable
    /// produce a warning and are ignored.
    pub fn collect(
        &self,
        definitions: &[VariableDefinition],
        cli: &VariableMap,
        base: &VariableMap,
        interactive: bool,
    ) -> KilnResult<Collected> {
        let mut collected = Collected {
            values: base.clone(),
            warnings: Vec::new(),
        };

        for name in cli.keys() {
            let declared = definitions.iter().any(|d| &d.name == name);
            if !declared && !base.contains_key(name) {
                warn!(variable = %name, "Ignoring value for undeclared variable");
                collected
                    .warnings
                    .push(format!("unknown variable '{name}' ignored"));
            }
        }

        for def in definitions {
            let raw = match (cli.get(&def.name), base.get(&def.name)) {
                (Some(value), _) => Some(value.clone()),
                (None, Some(recorded)) => Some(recorded.clone()),
                (None, None) => {
                    let default = Self::default_for(def, &collected.values)?;
                    match (interactive, self.prompter) {
                        (true, Some(prompter)) => Some(prompter.prompt(def, default)?),
                        _ => default,
                    }
                }
            };

            match raw {
                Some(raw) => {
                    let value = def.validate(&raw)?;
                    debug!(variable = %def.name, value = %value, "Resolved variable");
                    collected.values.insert(def.name.clone(), value);
                }
                None if def.required => {
                    return Err(DomainError::MissingRequiredVariable {
                        name: def.name.clone(),
                    }
                    .into());
                }
                None => {
                    debug!(variable = %def.name, "Optional variable left unset");
                }
            }
        }

        Ok(collected)
    }

    // ------ Internal Helpers ------

    /// The declared default; string defaults are rendered against the
    /// answers resolved so far.
    fn default_for(
        def: &VariableDefinition,
        resolved: &VariableMap,
    ) -> Result<Option<VariableValue>, DomainError> {
        match &def.default {
            Some(VariableValue::String(source)) if def.has_templated_default() => {
                lang::render_str(source, resolved).map(|s| Some(VariableValue::String(s)))
            }
            other => Ok(other.clone()),
        }
    }
}
