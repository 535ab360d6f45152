//! `kiln config` commands.

use crate::{
    cli::ConfigCommands,
    config::AppConfig,
    engine::Engine,
    error::{CliError, CliResult},
    output::OutputManager,
};

/// Dispatch to the correct config subcommand.
pub fn execute(
    cmd: ConfigCommands,
    config: &AppConfig,
    engine: &Engine,
    output: &OutputManager,
) -> CliResult<()> {
    match cmd {
        ConfigCommands::Show => {
            output.json(config)?;
            let serialised = render(config)?;
            output.header("Effective configuration:")?;
            output.print(&serialised)?;
            output.print(&format!("# cache in use: {}", engine.cache_dir().display()))?;
        }

        ConfigCommands::Path => {
            let path = AppConfig::config_path();
            output.json(&serde_json::json!({ "path": &path }))?;
            output.print(&path.display().to_string())?;
        }
    }

    Ok(())
}

fn render(config: &AppConfig) -> CliResult<String> {
    toml::to_string_pretty(config).map_err(|e| CliError::ConfigError {
        message: format!("Failed to serialise config: {e}"),
        source: Some(Box::new(e)),
    })
}
