//! Hook runner: one isolated child process per hook.

use std::ffi::OsString;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use kiln_core::{
    application::{
        ApplicationError,
        ports::{HookRequest, HookResult, HookRunner},
    },
    error::{KilnError, KilnResult},
};

use crate::process::run_with_timeout;

/// The only variables a hook inherits from the parent.
const INHERITED_ENV: [&str; 3] = ["PATH", "HOME", "LANG"];

/// Runs hooks as child processes with a cleared environment.
///
/// A hook sees `PATH`, `HOME` and `LANG` from the parent, plus
/// `KILN_PHASE` and `KILN_ANSWERS` (the collected answers as a JSON object).
#[derive(Debug, Clone)]
pub struct ProcessHookRunner {
    inherited: Vec<(&'static str, OsString)>,
    /// Upper bound applied on top of the template's own timeout.
    max_timeout: Option<Duration>,
}

impl ProcessHookRunner {
    pub fn new() -> Self {
        Self {
            inherited: INHERITED_ENV
                .iter()
                .filter_map(|key| std::env::var_os(key).map(|value| (*key, value)))
                .collect(),
            max_timeout: None,
        }
    }

    pub fn with_max_timeout(mut self, limit: Duration) -> Self {
        self.max_timeout = Some(limit);
        self
    }

    fn timeout_for(&self, requested: Duration) -> Duration {
        self.max_timeout.map_or(requested, |limit| requested.min(limit))
    }
}

impl Default for ProcessHookRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRunner for ProcessHookRunner {
    #[instrument(skip_all, fields(phase = request.phase.as_str(), program = ?request.command.first()))]
    fn run(&self, request: &HookRequest) -> KilnResult<HookResult> {
        let failed = |reason: String| -> KilnError {
            ApplicationError::HookFailed {
                phase: request.phase.as_str().into(),
                reason,
            }
            .into()
        };

        let (program, args) = request
            .command
            .split_first()
            .ok_or_else(|| failed("empty command".into()))?;
        let answers = serde_json::to_string(&request.variables)
            .map_err(|e| failed(format!("cannot encode answers: {e}")))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&request.working_dir)
            .env_clear()
            .envs(self.inherited.iter().cloned())
            .env("KILN_PHASE", request.phase.as_str())
            .env("KILN_ANSWERS", answers);

        let timeout = self.timeout_for(request.timeout);
        let output = run_with_timeout(&mut command, timeout)
            .map_err(|e| failed(format!("cannot start '{program}': {e}")))?;

        if output.timed_out {
            warn!(?timeout, "Hook killed after timeout");
        } else {
            debug!(exit_code = ?output.exit_code, duration = ?output.duration, "Hook finished");
        }

        Ok(HookResult {
            phase: request.phase,
            success: output.success,
            exit_code: output.exit_code,
            timed_out: output.timed_out,
            stdout: output.stdout,
            stderr: output.stderr,
            duration: output.duration,
        })
    }
}
