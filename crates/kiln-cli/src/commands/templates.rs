//! Implementation of the `kiln templates` commands.

use kiln_core::domain::TemplateSummary;

use crate::{
    cli::TemplatesCommands,
    engine::{Engine, template_ref},
    error::CliResult,
    output::OutputManager,
};

/// Dispatch to the correct templates subcommand.
pub fn execute(cmd: TemplatesCommands, engine: &Engine, output: &OutputManager) -> CliResult<()> {
    let service = engine.template_service();

    match cmd {
        TemplatesCommands::List => {
            let templates = service.list()?;
            output.json(&templates)?;
            if templates.is_empty() {
                output.info(&format!(
                    "No cached templates in {}",
                    engine.cache_dir().display()
                ))?;
            } else {
                output.header("Cached templates:")?;
                for summary in &templates {
                    output.print(&format!("  {}", describe(summary)))?;
                }
            }
        }

        TemplatesCommands::Refresh { name } => {
            let spinner = output.spinner(&format!("Refreshing {name}"));
            let updated = service.refresh(&name);
            if let Some(bar) = spinner {
                bar.finish_and_clear();
            }
            let updated = updated?;

            output.json(&serde_json::json!({ "name": &name, "updated": updated }))?;
            if updated {
                output.success(&format!("Cached a new copy of {name}"))?;
            } else {
                output.info(&format!("{name} is up to date"))?;
            }
        }

        TemplatesCommands::Inspect { reference } => {
            let summary = service.inspect_ref(&template_ref(&reference)?)?;
            output.json(&summary)?;
            output.header(&format!("{} {}", summary.name, summary.version))?;
            if let Some(description) = &summary.description {
                output.print(&format!("  {description}"))?;
            }
            output.print(&format!("  source:  {}", summary.source))?;
            if !summary.modules.is_empty() {
                output.print(&format!("  modules: {}", summary.modules.join(", ")))?;
            }
        }
    }

    Ok(())
}

fn describe(summary: &TemplateSummary) -> String {
    let mut line = format!("{} @ {}  ({})", summary.name, summary.version, summary.source);
    if !summary.modules.is_empty() {
        line.push_str(&format!("  modules: {}", summary.modules.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::domain::SourceDescriptor;
    use semver::Version;

    #[test]
    fn describe_lists_modules() {
        let summary = TemplateSummary {
            name: "rust-service".into(),
            version: Version::new(1, 2, 0),
            description: None,
            source: SourceDescriptor::Git {
                url: "https://github.com/acme/rust-service.git".into(),
                rev: None,
            },
            modules: vec!["handler".into(), "job".into()],
        };
        assert_eq!(
            describe(&summary),
            "rust-service @ 1.2.0  (https://github.com/acme/rust-service.git)  modules: handler, job"
        );
    }
}
