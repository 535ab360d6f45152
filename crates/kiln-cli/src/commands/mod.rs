//! One module per subcommand.  Handlers translate arguments into engine
//! requests and render the results; no business logic lives here.

pub mod add;
pub mod check;
pub mod config;
pub mod new;
pub mod templates;
pub mod update;

use crate::{error::CliResult, output::OutputManager};

/// Print result warnings, engine and quality alike.
fn print_warnings<'a>(
    output: &OutputManager,
    warnings: impl IntoIterator<Item = &'a String>,
) -> CliResult<()> {
    for warning in warnings {
        output.warning(warning)?;
    }
    Ok(())
}
