//! Quality gate: built-in syntax checks plus manifest-declared commands.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, instrument};

use kiln_core::{
    application::ports::{QualityFinding, QualityGate, QualityPhase, QualityReport, QualityRequest},
    domain::{QualityCheckSpec, QualityKind, RelativePath},
    error::KilnResult,
};

use crate::process::run_with_timeout;

pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(300);

/// Parses generated JSON, TOML and YAML, and runs `[[quality]]` commands
/// in the output directory.
///
/// The syntax phase reports parse errors and failing `syntax` checks as
/// errors. The lint phase runs `lint` checks and reports failures as
/// warnings.
#[derive(Debug, Clone)]
pub struct StandardQualityGate {
    timeout: Duration,
}

impl StandardQualityGate {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run_check(&self, dir: &Path, check: &QualityCheckSpec) -> Option<QualityFinding> {
        let finding = |message: String| {
            Some(QualityFinding {
                check: check.name.clone(),
                path: None,
                message,
            })
        };
        let (program, args) = check.command.split_first()?;

        let mut command = Command::new(program);
        command.args(args).current_dir(dir);

        match run_with_timeout(&mut command, self.timeout) {
            Ok(out) if out.success => None,
            Ok(out) if out.timed_out => {
                finding(format!("timed out after {}s", self.timeout.as_secs()))
            }
            Ok(out) => {
                let code = out
                    .exit_code
                    .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));
                match out.last_line() {
                    "" => finding(code),
                    detail => finding(format!("{code}: {detail}")),
                }
            }
            Err(e) => finding(format!("cannot run '{program}': {e}")),
        }
    }
}

impl Default for StandardQualityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityGate for StandardQualityGate {
    #[instrument(skip_all, fields(dir = %request.dir.display(), phase = ?request.phase))]
    fn check(&self, request: &QualityRequest) -> KilnResult<QualityReport> {
        let mut report = QualityReport::default();

        let wanted = match request.phase {
            QualityPhase::Syntax => {
                report.errors = request
                    .files
                    .par_iter()
                    .filter_map(|path| check_syntax(&request.dir, path))
                    .collect();
                QualityKind::Syntax
            }
            QualityPhase::Lint => QualityKind::Lint,
        };

        let findings: Vec<QualityFinding> = request
            .checks
            .iter()
            .filter(|c| c.kind == wanted)
            .filter_map(|check| {
                debug!(check = %check.name, "Running quality check");
                self.run_check(&request.dir, check)
            })
            .collect();

        match request.phase {
            QualityPhase::Syntax => report.errors.extend(findings),
            QualityPhase::Lint => report.warnings.extend(findings),
        }

        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Quality gate finished"
        );
        Ok(report)
    }
}

// ------ Internal Helpers ------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    Json,
    Toml,
    Yaml,
}

impl Syntax {
    fn for_path(path: &RelativePath) -> Option<Self> {
        let ext = Path::new(path.as_str()).extension()?.to_str()?;
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
        }
    }

    fn parse(self, text: &str) -> Result<(), String> {
        match self {
            Self::Json => serde_json::from_str::<serde_json::Value>(text)
                .map(drop)
                .map_err(|e| e.to_string()),
            Self::Toml => text
                .parse::<toml::Table>()
                .map(drop)
                .map_err(|e| e.message().to_string()),
            Self::Yaml => serde_yaml::Deserializer::from_str(text)
                .try_for_each(|doc| serde_yaml::Value::deserialize(doc).map(drop))
                .map_err(|e| e.to_string()),
        }
    }
}

fn check_syntax(dir: &Path, path: &RelativePath) -> Option<QualityFinding> {
    let syntax = Syntax::for_path(path)?;
    let finding = |message: String| QualityFinding {
        check: syntax.name().into(),
        path: Some(path.clone()),
        message,
    };
    match std::fs::read_to_string(dir.join(path.as_str())) {
        Ok(text) => syntax.parse(&text).err().map(finding),
        Err(e) => Some(finding(format!("cannot read: {e}"))),
    }
}
