//! Fetchers: materialise a template source into a local directory.
//!
//! | Source    | Fetcher          | Feature |
//! |-----------|------------------|---------|
//! | `Local`   | [`copy_tree`]    | always  |
//! | `Git`     | `GitFetcher`     | `git`   |
//! | `Archive` | `ArchiveFetcher` | `http`  |

#[cfg(feature = "http")]
mod archive;
#[cfg(feature = "git")]
mod git;

use std::path::{Path, PathBuf};
use std::time::Duration;

use walkdir::WalkDir;

use kiln_core::{
    application::ApplicationError,
    domain::SourceDescriptor,
    error::{KilnError, KilnResult},
};

use crate::manifest::MANIFEST_FILE;

#[cfg(feature = "http")]
pub use archive::{ArchiveFetcher, unpack_tar_gz};
#[cfg(feature = "git")]
pub use git::GitFetcher;

/// Downloads (or copies) a template source.
pub trait Fetcher: Send + Sync {
    /// Materialise `source` into `dest`, which does not exist yet.
    ///
    /// Failures are reported as `SourceUnavailable` so the caller can
    /// retry them.
    fn fetch(&self, source: &SourceDescriptor, dest: &Path) -> KilnResult<()>;
}

/// How often and how patiently remote fetches are retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Linear backoff: attempt `n` waits `n * base`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(attempt as u64))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 250,
        }
    }
}

/// Dispatches on the source kind to the fetchers compiled in.
#[derive(Default)]
pub struct SourceFetcher {
    #[cfg(feature = "git")]
    git: GitFetcher,
    #[cfg(feature = "http")]
    archive: ArchiveFetcher,
}

impl SourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Fetcher for SourceFetcher {
    fn fetch(&self, source: &SourceDescriptor, dest: &Path) -> KilnResult<()> {
        match source {
            SourceDescriptor::Local { path } => copy_tree(path, dest),
            #[cfg(feature = "git")]
            SourceDescriptor::Git { url, rev } => self.git.clone_into(url, rev.as_deref(), dest),
            #[cfg(feature = "http")]
            SourceDescriptor::Archive { url } => self.archive.download_into(url, dest),
            #[allow(unreachable_patterns)]
            other => Err(unavailable(other, "support for this source kind is not compiled in")),
        }
    }
}

/// Copy a template tree, skipping any `.git` directory.
pub fn copy_tree(from: &Path, to: &Path) -> KilnResult<()> {
    let io = |path: &Path, e: std::io::Error| -> KilnError {
        ApplicationError::FilesystemError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    };

    let walker = WalkDir::new(from)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            io(&path, e.into())
        })?;
        let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| io(&target, e))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).map_err(|e| io(entry.path(), e))?;
        }
    }
    Ok(())
}

/// The directory holding `template.toml` inside a fetched tree.
///
/// Archives usually wrap everything in one top-level directory
/// (`repo-1.2.0/`); that directory is used when the root has no manifest.
pub fn template_root(fetched: &Path) -> KilnResult<PathBuf> {
    if fetched.join(MANIFEST_FILE).is_file() {
        return Ok(fetched.to_path_buf());
    }
    let entries: Vec<PathBuf> = std::fs::read_dir(fetched)
        .map_err(|e| ApplicationError::FilesystemError {
            path: fetched.to_path_buf(),
            reason: e.to_string(),
        })?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    match entries.as_slice() {
        [only] if only.join(MANIFEST_FILE).is_file() => Ok(only.clone()),
        _ => Ok(fetched.to_path_buf()),
    }
}

pub(crate) fn unavailable(source: &SourceDescriptor, reason: impl ToString) -> KilnError {
    ApplicationError::SourceUnavailable {
        source_desc: source.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
