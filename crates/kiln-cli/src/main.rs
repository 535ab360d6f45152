//! # Kiln CLI
//!
//! Template scaffolding and upgrade tool.
//!
//! ## Startup sequence
//!
//! 1. Parse CLI arguments (clap handles `--help` / `--version` early-exit).
//! 2. Load configuration (defaults, file, `KILN_*` environment).
//! 3. Initialise the tracing subscriber, which may log to `logging.file`.
//! 4. Build the [`OutputManager`] and the engine wiring.
//! 5. Dispatch to the appropriate command handler.
//! 6. Translate any [`CliError`] into a user-facing message and exit code.
//!
//! ## Exit codes
//!
//! | Code | Meaning                       |
//! |------|-------------------------------|
//! |  0   | Success                       |
//! |  1   | Internal / system error       |
//! |  2   | User / input error            |
//! |  3   | Template or project not found |
//! |  4   | Configuration error           |
//! |  5   | Unresolved merge conflicts    |

use std::io::IsTerminal as _;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info, instrument, warn};

use kiln_core::application::CancellationToken;

use crate::{
    cli::{Cli, Commands},
    config::AppConfig,
    engine::Engine,
    error::{CliError, CliResult},
    logging::init_logging,
    output::OutputManager,
};

mod cli;
mod commands;
mod config;
mod engine;
mod error;
mod logging;
mod output;
#[cfg(feature = "interactive")]
mod prompt;

fn main() -> ExitCode {
    // Missing .env is fine.
    let _ = dotenvy::dotenv();

    // ── 1. Parse arguments ────────────────────────────────────────────────
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version arrive here too and exit 0.
            let code = if e.use_stderr() { 2 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };
    let verbose = cli.global.verbose > 0;

    // ── 2. Load configuration ─────────────────────────────────────────────
    let config = match AppConfig::load(cli.global.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            let err = CliError::ConfigError {
                message: format!("{e:#}"),
                source: None,
            };
            eprint!("{}", err.format_plain(verbose));
            return ExitCode::from(err.exit_code());
        }
    };

    // ── 3. Initialise tracing ─────────────────────────────────────────────
    let _log_guard = match init_logging(&cli.global, &config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialise logging: {e:#}");
            return ExitCode::from(1);
        }
    };

    debug!(
        verbose = cli.global.verbose,
        quiet = cli.global.quiet,
        no_color = cli.global.no_color,
        "CLI started"
    );

    // ── 4. Output + engine ────────────────────────────────────────────────
    let output = OutputManager::new(&cli.global, &config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || on_interrupt.cancel()) {
        warn!("Cannot install Ctrl-C handler: {e}");
    }
    let engine = Engine::new(&cli.global, &config, cancel);

    // ── 5. Dispatch + 6. Error handling ──────────────────────────────────
    match run(cli.command, &engine, &config, &output) {
        Ok(()) => {
            info!("Kiln completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => handle_error(e, &output, verbose),
    }
}

/// Dispatch to the correct command handler.
#[instrument(skip_all)]
fn run(
    command: Commands,
    engine: &Engine,
    config: &AppConfig,
    output: &OutputManager,
) -> CliResult<()> {
    match command {
        Commands::New(args) => commands::new::execute(args, engine, config, output),
        Commands::Add(args) => commands::add::execute(args, engine, output),
        Commands::Update(args) => commands::update::execute(args, engine, output),
        Commands::Check(args) => commands::check::execute(args, engine, output),
        Commands::Templates(cmd) => commands::templates::execute(cmd, engine, output),
        Commands::Config(cmd) => commands::config::execute(cmd, config, engine, output),
    }
}

/// Translate a `CliError` into a user message and an appropriate exit code.
fn handle_error(err: CliError, output: &OutputManager, verbose: bool) -> ExitCode {
    err.log();

    let msg = if output.is_json() {
        format!("{}\n", err.format_json())
    } else if std::io::stderr().is_terminal() && output.supports_color() {
        err.format_colored(verbose)
    } else {
        err.format_plain(verbose)
    };
    eprint!("{msg}");

    ExitCode::from(err.exit_code())
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_version_matches_cargo() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_version(), Some(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn cli_has_author() {
        let cmd = Cli::command();
        assert!(cmd.get_author().is_some());
    }
}
