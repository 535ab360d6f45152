//! Implementation of the `kiln update` command.

use tracing::{info, instrument};

use kiln_core::application::{UpdateOutcome, UpdateReport, UpdateRequest};
use kiln_core::domain::merge::FileUpdateState;

use crate::{
    cli::UpdateArgs,
    engine::Engine,
    error::{CliError, CliResult},
    output::OutputManager,
};

/// Execute the `kiln update` command.
///
/// A merge that leaves conflict markers still publishes; the report is
/// printed and the command exits with code 5.
#[instrument(skip_all, fields(project = %args.project.dir.display(), to = ?args.to))]
pub fn execute(args: UpdateArgs, engine: &Engine, output: &OutputManager) -> CliResult<()> {
    let dir = args.project.dir;
    let service = engine.scaffold_service();
    let spinner = output.spinner("Updating project");

    let report = service.update(UpdateRequest {
        project_dir: dir.clone(),
        target_version: args.to,
        strategy: args.strategy.into(),
        delete_removed: args.delete_removed,
        variables: args.answers.variables(),
        interactive: engine.interactive(args.answers.no_input),
    });
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let report = report?;

    info!(
        from = %report.from,
        to = %report.to,
        conflicts = report.unresolved_conflict_count,
        "Update finished"
    );
    output.json(&report)?;
    print_report(&report, output)?;

    match report.outcome() {
        UpdateOutcome::Success => Ok(()),
        UpdateOutcome::SuccessWithConflicts => Err(CliError::UnresolvedConflicts { dir }),
    }
}

fn print_report(report: &UpdateReport, output: &OutputManager) -> CliResult<()> {
    if report.is_noop() {
        output.success(&format!("Already up to date with {}", report.to))?;
        return Ok(());
    }

    output.header(&format!("Updated {} -> {}", report.from, report.to))?;
    for file in report
        .files
        .iter()
        .filter(|f| f.state != FileUpdateState::Unchanged)
    {
        output.print(&format!("  {:<16} {}", file.state.name(), file.path))?;
    }

    for conflict in &report.conflicts {
        let lines = conflict
            .regions
            .iter()
            .map(|r| format!("{}-{}", r.start_line, r.end_line))
            .collect::<Vec<_>>()
            .join(", ");
        output.warning(&format!("Conflict in {} (lines {lines})", conflict.path))?;
    }
    if !report.stale_variables.is_empty() {
        output.info(&format!(
            "Kept values for variables the template no longer declares: {}",
            report.stale_variables.join(", ")
        ))?;
    }

    super::print_warnings(output, &report.warnings)?;
    for finding in &report.quality {
        output.warning(&finding.to_string())?;
    }

    if report.outcome() == UpdateOutcome::Success {
        output.success("Update applied cleanly")?;
    }
    Ok(())
}
