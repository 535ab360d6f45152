//! Wiring of engine services from configuration.

use std::io::IsTerminal as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use kiln_adapters::{
    CacheStore, LocalFilesystem, ParallelRenderer, ProcessHookRunner, RetryPolicy,
    StandardQualityGate,
};
use kiln_core::application::{CancellationToken, ScaffoldService, TemplateService};
use kiln_core::domain::TemplateRef;

use crate::{cli::GlobalArgs, config::AppConfig, error::CliResult};

/// Settings shared by every command that touches the engine.
#[derive(Debug, Clone)]
pub struct Engine {
    cache_dir: PathBuf,
    retry: RetryPolicy,
    hook_limit: Option<Duration>,
    interactive: bool,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(global: &GlobalArgs, config: &AppConfig, cancel: CancellationToken) -> Self {
        let cache_dir = global.cache_dir.clone().unwrap_or_else(|| config.cache_dir());
        debug!(cache = %cache_dir.display(), "Engine configured");
        Self {
            cache_dir,
            retry: RetryPolicy::new(config.cache.fetch_retries),
            hook_limit: config.hooks.timeout_secs.map(Duration::from_secs),
            interactive: config.generate.interactive && std::io::stdin().is_terminal(),
            cancel,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Prompting is on unless disabled by flag or config, or stdin is not
    /// a terminal.
    pub fn interactive(&self, no_input: bool) -> bool {
        self.interactive && !no_input
    }

    pub fn scaffold_service(&self) -> ScaffoldService {
        let mut hooks = ProcessHookRunner::new();
        if let Some(limit) = self.hook_limit {
            hooks = hooks.with_max_timeout(limit);
        }

        let service = ScaffoldService::new(
            Box::new(self.store()),
            Box::new(ParallelRenderer::new()),
            Box::new(LocalFilesystem::new()),
            Box::new(hooks),
            Box::new(StandardQualityGate::new()),
        )
        .with_cancellation(self.cancel.clone());

        with_prompter(service, self.interactive)
    }

    pub fn template_service(&self) -> TemplateService {
        TemplateService::new(Box::new(self.store()))
    }

    // ------ Internal Helpers ------

    fn store(&self) -> CacheStore {
        CacheStore::new(&self.cache_dir).with_retry(self.retry.clone())
    }
}

#[cfg(feature = "interactive")]
fn with_prompter(service: ScaffoldService, interactive: bool) -> ScaffoldService {
    if interactive {
        service.with_prompter(Box::new(crate::prompt::TerminalPrompter::new()))
    } else {
        service
    }
}

#[cfg(not(feature = "interactive"))]
fn with_prompter(service: ScaffoldService, _interactive: bool) -> ScaffoldService {
    service
}

/// Parse a template reference, treating an existing directory as local
/// even without a `./` prefix.
pub fn template_ref(raw: &str) -> CliResult<TemplateRef> {
    if Path::new(raw).is_dir() {
        return Ok(TemplateRef::Local(PathBuf::from(raw)));
    }
    Ok(TemplateRef::parse(raw).map_err(kiln_core::error::KilnError::from)?)
}
