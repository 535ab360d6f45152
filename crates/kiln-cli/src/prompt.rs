//! Terminal prompts for unresolved template variables.

use std::io;

use dialoguer::{Confirm, FuzzySelect, Input, theme::ColorfulTheme};

use kiln_core::{
    application::{ApplicationError, Prompter},
    domain::{VariableDefinition, VariableType, VariableValue},
    error::{KilnError, KilnResult},
};

/// Asks on the controlling terminal, one widget per variable type.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Prompter for TerminalPrompter {
    fn prompt(
        &self,
        definition: &VariableDefinition,
        suggested: Option<VariableValue>,
    ) -> KilnResult<VariableValue> {
        let theme = ColorfulTheme::default();
        let text = definition.prompt_text();
        let failed = |e: dialoguer::Error| prompt_error(&definition.name, e);

        match &definition.kind {
            VariableType::Bool => {
                let default = suggested.as_ref().is_some_and(VariableValue::is_truthy);
                Confirm::with_theme(&theme)
                    .with_prompt(text)
                    .default(default)
                    .interact()
                    .map(VariableValue::Bool)
                    .map_err(failed)
            }
            VariableType::Choice(choices) => {
                let default = suggested
                    .as_ref()
                    .and_then(|s| choices.iter().position(|c| *c == s.to_string()))
                    .unwrap_or(0);
                FuzzySelect::with_theme(&theme)
                    .with_prompt(text)
                    .items(choices)
                    .default(default)
                    .interact()
                    .map(|i| VariableValue::String(choices[i].clone()))
                    .map_err(failed)
            }
            VariableType::Int | VariableType::String => {
                let mut input = Input::<String>::with_theme(&theme)
                    .with_prompt(text)
                    .allow_empty(!definition.required)
                    .validate_with(|raw: &String| -> Result<(), String> {
                        definition
                            .validate(&VariableValue::from(raw.as_str()))
                            .map(|_| ())
                            .map_err(|e| e.to_string())
                    });
                if let Some(value) = &suggested {
                    input = input.default(value.to_string());
                }
                let raw = input.interact_text().map_err(failed)?;
                definition
                    .validate(&VariableValue::from(raw))
                    .map_err(KilnError::from)
            }
        }
    }
}

fn prompt_error(name: &str, err: dialoguer::Error) -> KilnError {
    match &err {
        dialoguer::Error::IO(e) if e.kind() == io::ErrorKind::Interrupted => {
            ApplicationError::Cancelled.into()
        }
        _ => KilnError::Internal {
            message: format!("cannot read a value for '{name}': {err}"),
        },
    }
}
