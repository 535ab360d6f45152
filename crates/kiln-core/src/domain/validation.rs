use crate::domain::{
    entities::{ProjectStructure, Template, is_identifier, validate_template_name},
    error::DomainError,
};

/// Centralized domain validation.
///
/// Entry points check names here before touching the store or disk.
pub struct DomainValidator;

impl DomainValidator {
    /// The project name is the final component of the output directory.
    pub fn validate_project_name(name: &str) -> Result<(), DomainError> {
        let fail = |reason: &str| DomainError::InvalidProjectName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(fail("name cannot be empty"));
        }
        if name == "." || name == ".." {
            return Err(fail("name cannot be '.' or '..'"));
        }
        if name.len() > 255 {
            return Err(fail("name is longer than 255 bytes"));
        }
        if name.chars().any(|c| c.is_control() || c == '/' || c == '\\') {
            return Err(fail("name contains a path separator or control character"));
        }
        Ok(())
    }

    /// Module names become identifiers in generated code.
    pub fn validate_module_name(name: &str) -> Result<(), DomainError> {
        if is_identifier(name) {
            Ok(())
        } else {
            Err(DomainError::InvalidModuleName {
                name: name.to_string(),
                reason: "must start with a letter or '_' and contain only letters, digits and '_'"
                    .into(),
            })
        }
    }

    pub fn validate_template_name(name: &str) -> Result<(), DomainError> {
        validate_template_name(name)
    }

    pub fn validate_template(template: &Template) -> Result<(), DomainError> {
        template.validate()
    }

    pub fn validate_project_structure(structure: &ProjectStructure) -> Result<(), DomainError> {
        structure.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_names() {
        assert!(DomainValidator::validate_project_name("my-app").is_ok());
        assert!(DomainValidator::validate_project_name("My App").is_ok());
        assert!(DomainValidator::validate_project_name("").is_err());
        assert!(DomainValidator::validate_project_name("..").is_err());
        assert!(DomainValidator::validate_project_name("a/b").is_err());
    }

    #[test]
    fn module_names() {
        assert!(DomainValidator::validate_module_name("billing_api").is_ok());
        assert!(DomainValidator::validate_module_name("billing-api").is_err());
        assert!(DomainValidator::validate_module_name("1st").is_err());
    }
}
