//! Implementation of the `kiln add` command.

use tracing::{info, instrument};

use kiln_core::application::ModuleRequest;

use crate::{
    cli::AddArgs,
    engine::Engine,
    error::CliResult,
    output::OutputManager,
};

/// Execute the `kiln add` command.
#[instrument(skip_all, fields(module_type = %args.module_type, name = %args.name))]
pub fn execute(args: AddArgs, engine: &Engine, output: &OutputManager) -> CliResult<()> {
    let service = engine.scaffold_service();
    let result = service.add_module(ModuleRequest {
        project_dir: args.project.dir.clone(),
        module_type: args.module_type,
        module_name: args.name,
        variables: args.answers.variables(),
        interactive: engine.interactive(args.answers.no_input),
    })?;

    info!(created = result.files.len(), modified = result.modified.len(), "Module added");
    output.json(&result)?;

    output.success(&format!(
        "Added {} '{}' to {}",
        result.module_type,
        result.name,
        args.project.dir.display()
    ))?;
    for file in &result.files {
        output.print(&format!("  created  {file}"))?;
    }
    for file in &result.modified {
        output.print(&format!("  modified {file}"))?;
    }
    super::print_warnings(output, &result.warnings)?;
    for finding in &result.quality.warnings {
        output.warning(&finding.to_string())?;
    }
    Ok(())
}
