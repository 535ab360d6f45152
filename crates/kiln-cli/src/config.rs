//! Application configuration.
//!
//! [`AppConfig`] is loaded once at startup and passed down by value.  The
//! CLI layer owns config; the core crate never sees it.
//!
//! # Resolution order (highest priority first)
//!
//! 1. CLI flags (handled at the call-site, not here)
//! 2. `KILN_*` environment variables, `__` between sections
//!    (`KILN_CACHE__FETCH_RETRIES=5`); `.env` is loaded first
//! 3. Config file (`--config FILE`, else the platform config dir)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};

use anyhow::Context;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use kiln_core::application::OverwriteMode;

const ENV_PREFIX: &str = "KILN";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub hooks: HooksConfig,
    pub generate: GenerateConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; the platform cache dir when unset.
    pub dir: Option<PathBuf>,
    /// Attempts per remote fetch, including the first.
    pub fetch_retries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            fetch_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Upper bound on any hook's runtime, in seconds.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    pub overwrite: OverwriteMode,
    /// Prompt for unresolved variables when stdin is a terminal.
    pub interactive: bool,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            overwrite: OverwriteMode::Reject,
            interactive: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub no_color: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSON log file written alongside the terminal output.
    pub file: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the process
    /// environment.
    ///
    /// `config_file` is the path passed via `--config`; it must exist.  The
    /// default location is optional.
    pub fn load(config_file: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with(config_file, environment())
    }

    fn load_with(config_file: Option<&Path>, env: Environment) -> anyhow::Result<Self> {
        let file = match config_file {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::from(Self::config_path()).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("failed to read configuration")?;

        let loaded: Self = config
            .try_deserialize()
            .context("invalid configuration value")?;
        if loaded.cache.fetch_retries == 0 {
            anyhow::bail!("cache.fetch_retries must be at least 1");
        }
        Ok(loaded)
    }

    /// Path to the default configuration file.
    ///
    /// Uses `directories::ProjectDirs` for cross-platform correctness,
    /// falling back to `.kiln.toml` in the current directory.
    pub fn config_path() -> PathBuf {
        project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".kiln.toml"))
    }

    /// Effective template cache root.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|d| d.cache_dir().join("templates"))
                .unwrap_or_else(|| PathBuf::from(".kiln-cache"))
        })
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "kiln", "kiln")
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
