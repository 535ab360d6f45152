//! Implementation of the `kiln check` command.

use crate::{
    cli::CheckArgs,
    engine::Engine,
    error::{CliError, CliResult},
    output::OutputManager,
};

/// Exit 0 when no conflict markers or template sidecars remain, 5 otherwise.
pub fn execute(args: CheckArgs, engine: &Engine, output: &OutputManager) -> CliResult<()> {
    let dir = args.project.dir;
    let resolved = engine.scaffold_service().validate_resolved(&dir)?;

    output.json(&serde_json::json!({
        "project": &dir,
        "resolved": resolved,
    }))?;

    if resolved {
        output.success(&format!("No unresolved conflicts in {}", dir.display()))?;
        Ok(())
    } else {
        Err(CliError::UnresolvedConflicts { dir })
    }
}
