//! Implementation of the `kiln new` command.

use tracing::{info, instrument};

use kiln_core::application::{GenerateOptions, GenerateRequest, GenerationResult};

use crate::{
    cli::NewArgs,
    config::AppConfig,
    engine::{Engine, template_ref},
    error::{CliError, CliResult},
    output::OutputManager,
};

/// Execute the `kiln new` command.
///
/// 1. Classify the template reference
/// 2. Merge flags over configured defaults
/// 3. Run `ScaffoldService::generate`
/// 4. Print the file list (dry run) or a summary
#[instrument(skip_all, fields(template = %args.template, dir = %args.dir.display()))]
pub fn execute(
    args: NewArgs,
    engine: &Engine,
    config: &AppConfig,
    output: &OutputManager,
) -> CliResult<()> {
    if args.dir.is_file() {
        return Err(CliError::InvalidInput {
            message: format!("{} is a file, not a directory", args.dir.display()),
        });
    }

    let template = template_ref(&args.template)?;
    let options = GenerateOptions {
        interactive: engine.interactive(args.answers.no_input),
        dry_run: args.dry_run,
        overwrite: args
            .overwrite
            .map(Into::into)
            .unwrap_or(config.generate.overwrite),
    };

    let service = engine.scaffold_service();
    let spinner = if options.interactive {
        None
    } else {
        output.spinner(&format!("Generating from {template}"))
    };

    let result = service.generate(GenerateRequest {
        template,
        output_dir: args.dir.clone(),
        variables: args.answers.variables(),
        options,
    });
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let result = result?;

    info!(files = result.files.len(), dry_run = result.dry_run, "Generation finished");
    output.json(&result)?;
    report(&result, output)
}

fn report(result: &GenerationResult, output: &OutputManager) -> CliResult<()> {
    let dir = result.output_dir.display();

    if result.dry_run {
        output.info(&format!(
            "Dry run: {} would write {} file(s) to {dir}",
            result.template,
            result.files.len()
        ))?;
        for file in &result.files {
            output.print(&format!("  {file}"))?;
        }
    } else {
        output.success(&format!(
            "Generated {} into {dir} ({} files)",
            result.template,
            result.files.len()
        ))?;
    }

    if !result.skipped.is_empty() {
        output.info(&format!(
            "Kept {} existing file(s) untouched",
            result.skipped.len()
        ))?;
    }

    super::print_warnings(output, &result.warnings)?;
    for finding in &result.quality.warnings {
        output.warning(&finding.to_string())?;
    }

    if !result.dry_run && !output.is_quiet() {
        output.print("")?;
        output.print("Next steps:")?;
        output.print(&format!("  cd {dir}"))?;
    }
    Ok(())
}
