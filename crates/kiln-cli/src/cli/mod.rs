//! CLI argument definitions using the clap derive API.
//!
//! This module is the *only* place that knows about argument names, aliases,
//! help text, and value enums.  No business logic lives here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use semver::Version;

use kiln_core::application::{OverwriteMode, UpdateStrategy};
use kiln_core::domain::{VariableMap, VariableValue};

pub mod global;
pub use global::{GlobalArgs, OutputFormat};

// ── Top-level CLI ─────────────────────────────────────────────────────────────

/// Main CLI entry-point.
#[derive(Debug, Parser)]
#[command(
    name    = "kiln",
    bin_name = "kiln",
    version  = env!("CARGO_PKG_VERSION"),
    author   = env!("CARGO_PKG_AUTHORS"),
    about    = "Template scaffolding and upgrade engine",
    long_about = "Kiln generates projects from versioned templates, adds \
                  modules to them, and re-applies template upgrades without \
                  losing local edits.",
    after_help = "EXAMPLES:\n\
        \x20 kiln new ./templates/rust-service billing-api -d port=8080\n\
        \x20 kiln new gh:acme/rust-service#v1.2.0 billing-api --no-input\n\
        \x20 kiln add handler orders -p billing-api\n\
        \x20 kiln update -p billing-api --to 1.3.0",
    arg_required_else_help = true,
    subcommand_required    = true,
)]
pub struct Cli {
    /// Flags available on every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

// ── Subcommands ───────────────────────────────────────────────────────────────

/// All available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a new project from a template.
    #[command(
        visible_alias = "n",
        about = "Generate a new project",
        after_help = "EXAMPLES:\n\
            \x20 kiln new rust-service billing-api\n\
            \x20 kiln new rust-service@1.2.0 billing-api -d db=sqlite --dry-run\n\
            \x20 kiln new ./my-template out --overwrite skip-existing"
    )]
    New(NewArgs),

    /// Add a module to a generated project.
    #[command(
        about = "Add a module to a project",
        after_help = "EXAMPLES:\n\
            \x20 kiln add handler orders\n\
            \x20 kiln add handler invoices -p ../billing-api"
    )]
    Add(AddArgs),

    /// Re-apply a newer template version to a generated project.
    #[command(
        about = "Update a project to a newer template version",
        after_help = "EXAMPLES:\n\
            \x20 kiln update\n\
            \x20 kiln update -p billing-api --to 1.3.0 --strategy keep-local"
    )]
    Update(UpdateArgs),

    /// Report whether update conflicts are still unresolved.
    #[command(about = "Check for unresolved update conflicts")]
    Check(CheckArgs),

    /// Inspect and refresh the template cache.
    #[command(about = "Template cache management", subcommand)]
    Templates(TemplatesCommands),

    /// Show the active configuration.
    #[command(about = "Configuration management", subcommand)]
    Config(ConfigCommands),
}

// ── new ───────────────────────────────────────────────────────────────────────

/// Arguments for `kiln new`.
#[derive(Debug, Args)]
pub struct NewArgs {
    /// Template reference: a directory, `name[@version]`, `gh:owner/repo`,
    /// a `git+` URL or a `.tar.gz` URL.
    #[arg(value_name = "TEMPLATE", help = "Template reference")]
    pub template: String,

    /// Directory to generate into.
    #[arg(value_name = "DIR", help = "Output directory")]
    pub dir: PathBuf,

    #[command(flatten)]
    pub answers: AnswerArgs,

    /// Preview what would be created without writing any files.
    #[arg(long = "dry-run", help = "List the files without writing them")]
    pub dry_run: bool,

    /// What to do when the output directory already has content.
    #[arg(
        long = "overwrite",
        value_name = "MODE",
        value_enum,
        help = "Behaviour for an existing output directory"
    )]
    pub overwrite: Option<OverwriteArg>,
}

// ── add ───────────────────────────────────────────────────────────────────────

/// Arguments for `kiln add`.
#[derive(Debug, Args)]
pub struct AddArgs {
    /// Module type declared by the project's template.
    #[arg(value_name = "MODULE_TYPE")]
    pub module_type: String,

    /// Name of the new module instance.
    #[arg(value_name = "NAME")]
    pub name: String,

    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(flatten)]
    pub answers: AnswerArgs,
}

// ── update ────────────────────────────────────────────────────────────────────

/// Arguments for `kiln update`.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Target template version; defaults to the newest available.
    #[arg(long = "to", value_name = "VERSION", help = "Target template version")]
    pub to: Option<Version>,

    /// How local edits and template changes are reconciled.
    #[arg(
        long = "strategy",
        value_enum,
        default_value = "three-way-merge",
        help = "Update strategy"
    )]
    pub strategy: StrategyArg,

    /// Delete files the new version dropped, when they were never edited.
    #[arg(long = "delete-removed", help = "Delete files the template removed")]
    pub delete_removed: bool,

    #[command(flatten)]
    pub answers: AnswerArgs,
}

// ── check ─────────────────────────────────────────────────────────────────────

/// Arguments for `kiln check`.
#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

// ── shared argument groups ────────────────────────────────────────────────────

/// Location of an already generated project.
#[derive(Debug, Args)]
pub struct ProjectArgs {
    #[arg(
        short = 'p',
        long = "project",
        value_name = "DIR",
        default_value = ".",
        help = "Project directory"
    )]
    pub dir: PathBuf,
}

/// Variable values given on the command line.
#[derive(Debug, Args)]
pub struct AnswerArgs {
    /// Set a template variable; may be repeated.
    #[arg(
        short = 'd',
        long = "define",
        value_name = "KEY=VALUE",
        value_parser = parse_define,
        help = "Set a template variable (repeatable)"
    )]
    pub define: Vec<(String, String)>,

    /// Never prompt; missing required values are an error.
    #[arg(long = "no-input", help = "Disable interactive prompts")]
    pub no_input: bool,
}

impl AnswerArgs {
    /// Command-line values as raw strings; the engine coerces them to the
    /// declared types. A repeated key keeps its last value.
    pub fn variables(&self) -> VariableMap {
        self.define
            .iter()
            .map(|(k, v)| (k.clone(), VariableValue::from(v.as_str())))
            .collect()
    }
}

fn parse_define(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing variable name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

// ── templates / config subcommands ────────────────────────────────────────────

/// Subcommands for `kiln templates`.
#[derive(Debug, Subcommand)]
pub enum TemplatesCommands {
    /// List every cached template version.
    #[command(visible_alias = "ls")]
    List,
    /// Re-fetch a cached template from its source.
    Refresh {
        /// Template name.
        name: String,
    },
    /// Show a template's name, version, source and modules.
    Inspect {
        /// Template reference.
        reference: String,
    },
}

/// Subcommands for `kiln config`.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration.
    Show,
    /// Print the path of the default configuration file.
    Path,
}

// ── value enums ───────────────────────────────────────────────────────────────

/// `--overwrite` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverwriteArg {
    Reject,
    SkipExisting,
    Overwrite,
    Merge,
}

impl From<OverwriteArg> for OverwriteMode {
    fn from(arg: OverwriteArg) -> Self {
        match arg {
            OverwriteArg::Reject => Self::Reject,
            OverwriteArg::SkipExisting => Self::SkipExisting,
            OverwriteArg::Overwrite => Self::Overwrite,
            OverwriteArg::Merge => Self::Merge,
        }
    }
}

/// `--strategy` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    #[value(alias = "merge")]
    ThreeWayMerge,
    KeepLocal,
    TakeTemplate,
}

impl From<StrategyArg> for UpdateStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::ThreeWayMerge => Self::ThreeWayMerge,
            StrategyArg::KeepLocal => Self::KeepLocal,
            StrategyArg::TakeTemplate => Self::TakeTemplate,
        }
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────
