//! Staged, rename-based publishing of a rendered tree.
//!
//! ```text
//! <parent>/.kiln-stage-<uuid>   render lands here
//! <parent>/<target>             swapped in with one rename
//! <parent>/.kiln-backup-<uuid>  previous target, kept until the swap succeeds
//! ```
//!
//! The staging directory is a sibling of the target so the swap is a
//! same-filesystem rename. Every failure after staging starts leaves the
//! target exactly as it was.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::cancel::CancellationToken;
use crate::application::ports::{EntryKind, Filesystem, FsEntry};
use crate::application::ApplicationError;
use crate::domain::{FileContent, ProjectStructure, RelativePath};
use crate::error::{KilnError, KilnResult};

const STAGE_PREFIX: &str = ".kiln-stage-";
const BACKUP_PREFIX: &str = ".kiln-backup-";

/// What to do when the output directory already has content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverwriteMode {
    /// Fail with `DestinationConflict`.
    #[default]
    Reject,
    /// Existing files win over rendered ones.
    SkipExisting,
    /// Rendered files win over existing ones.
    Overwrite,
    /// Rendered files were already three-way merged with existing ones.
    Merge,
}

impl OverwriteMode {
    pub const ALL: [OverwriteMode; 4] = [
        Self::Reject,
        Self::SkipExisting,
        Self::Overwrite,
        Self::Merge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::SkipExisting => "skip-existing",
            Self::Overwrite => "overwrite",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for OverwriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverwriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown overwrite mode '{s}' (expected reject, skip-existing, overwrite or merge)"
                )
            })
    }
}

/// A staging directory paired with the target it will replace.
#[derive(Debug)]
pub struct Staging {
    pub dir: PathBuf,
    pub target: PathBuf,
}

/// Files a publish produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Rendered files now in the target.
    pub written: Vec<RelativePath>,
    /// Rendered files dropped because the target already had them.
    pub skipped: Vec<RelativePath>,
}

/// Writes a rendered tree into a staging directory and swaps it into place.
pub struct AtomicWriter<'a> {
    fs: &'a dyn Filesystem,
    cancel: &'a CancellationToken,
}

impl<'a> AtomicWriter<'a> {
    pub fn new(fs: &'a dyn Filesystem, cancel: &'a CancellationToken) -> Self {
        Self { fs, cancel }
    }

    /// Create an empty staging directory next to `target`.
    pub fn stage(&self, target: &Path) -> KilnResult<Staging> {
        let parent = parent_of(target);
        self.fs.create_dir_all(&parent)?;
        let dir = parent.join(format!("{STAGE_PREFIX}{}", Uuid::new_v4()));
        self.fs.create_dir_all(&dir)?;
        debug!(staging = %dir.display(), "Created staging directory");
        Ok(Staging {
            dir,
            target: target.to_path_buf(),
        })
    }

    /// Write every file of `structure` into the staging directory.
    pub fn write_structure(
        &self,
        staging: &Staging,
        structure: &ProjectStructure,
    ) -> KilnResult<()> {
        for file in structure.files() {
            self.cancel.check()?;
            let dest = file.path.under(&staging.dir);
            if let Some(parent) = dest.parent() {
                self.fs.create_dir_all(parent)?;
            }
            match &file.content {
                FileContent::Text(text) => self.fs.write_file(&dest, text.as_bytes())?,
                FileContent::Copy(source) => self.fs.copy_file(source, &dest)?,
            }
            if file.permissions.executable_flag() {
                self.fs.set_permissions(&dest, true)?;
            }
        }
        Ok(())
    }

    /// Swap the staged tree into the target.
    ///
    /// Existing entries the render did not produce (files, directories,
    /// symlinks) are carried over unless listed in `removals`. On error the target is left as it was and the
    /// staging directory is gone.
    #[instrument(skip_all, fields(target = %staging.target.display(), mode = %mode))]
    pub fn publish(
        &self,
        staging: Staging,
        mode: OverwriteMode,
        removals: &[RelativePath],
    ) -> KilnResult<PublishReport> {
        let staged = match self.fs.list_files(&staging.dir) {
            Ok(files) => files,
            Err(e) => return Err(self.abandon(staging, e)),
        };
        let target = staging.target.clone();

        if self.fs.exists(&target) && !self.fs.is_dir(&target) {
            return Err(self.abandon(
                staging,
                ApplicationError::DestinationConflict { path: target }.into(),
            ));
        }

        let existing = if self.fs.exists(&target) {
            match self.fs.list_entries(&target) {
                Ok(files) => files,
                Err(e) => return Err(self.abandon(staging, e)),
            }
        } else {
            Vec::new()
        };

        if existing.is_empty() {
            return self.publish_fresh(staging, staged);
        }

        if mode == OverwriteMode::Reject {
            return Err(self.abandon(
                staging,
                ApplicationError::DestinationConflict { path: target }.into(),
            ));
        }

        let skipped = match self.carry_over(&staging, &existing, &staged, mode, removals) {
            Ok(skipped) => skipped,
            Err(e) => return Err(self.abandon(staging, e)),
        };

        self.swap(staging)?;

        let skipped_set: BTreeSet<&RelativePath> = skipped.iter().collect();
        let written = staged
            .iter()
            .filter(|p| !skipped_set.contains(p))
            .cloned()
            .collect();
        info!(entries = existing.len(), "Published over existing directory");
        Ok(PublishReport { written, skipped })
    }

    /// Drop a staging directory. Failure is only logged.
    pub fn discard(&self, staging: Staging) {
        if let Err(e) = self.fs.remove_dir_all(&staging.dir) {
            warn!(staging = %staging.dir.display(), error = %e, "Failed to remove staging directory");
        }
    }

    // ------ Internal Helpers ------

    fn publish_fresh(&self, staging: Staging, staged: Vec<RelativePath>) -> KilnResult<PublishReport> {
        if let Err(e) = self.cancel.check() {
            return Err(self.abandon(staging, e.into()));
        }

        let target = staging.target.clone();
        let had_empty_dir = self.fs.exists(&target);
        if had_empty_dir {
            if let Err(e) = self.fs.remove_dir_all(&target) {
                return Err(self.abandon(staging, e));
            }
        }

        if let Err(e) = self.fs.rename(&staging.dir, &target) {
            let restored = !had_empty_dir || self.fs.create_dir_all(&target).is_ok();
            self.discard(staging);
            return Err(if restored {
                ApplicationError::PartialWriteRecovered {
                    path: target,
                    reason: e.to_string(),
                }
                .into()
            } else {
                ApplicationError::RollbackFailed {
                    path: target,
                    reason: e.to_string(),
                }
                .into()
            });
        }

        info!(files = staged.len(), "Published new directory");
        Ok(PublishReport {
            written: staged,
            skipped: Vec::new(),
        })
    }

    /// Recreate existing entries in staging so the swap keeps them.
    /// Returns the rendered paths that were replaced by existing content.
    fn carry_over(
        &self,
        staging: &Staging,
        existing: &[FsEntry],
        staged: &[RelativePath],
        mode: OverwriteMode,
        removals: &[RelativePath],
    ) -> KilnResult<Vec<RelativePath>> {
        let staged: BTreeSet<&RelativePath> = staged.iter().collect();
        let removals: BTreeSet<&RelativePath> = removals.iter().collect();
        let mut skipped = Vec::new();

        for entry in existing {
            self.cancel.check()?;
            let path = &entry.path;
            if removals.contains(path) {
                debug!(path = %path, "Dropping removed file");
                continue;
            }
            let dest = path.under(&staging.dir);

            let rendered = staged.contains(path);
            if rendered {
                if mode != OverwriteMode::SkipExisting || entry.kind == EntryKind::Dir {
                    continue;
                }
                self.fs.remove_file(&dest)?;
                skipped.push(path.clone());
            } else if self.fs.exists(&dest) {
                // Rendered content owns this path (a directory of rendered files).
                if entry.kind != EntryKind::Dir {
                    debug!(path = %path, "Existing entry shadowed by rendered directory");
                }
                continue;
            }

            if let Some(parent) = dest.parent() {
                self.fs.create_dir_all(parent)?;
            }
            match &entry.kind {
                EntryKind::Dir => self.fs.create_dir_all(&dest)?,
                EntryKind::File => self.fs.copy_file(&path.under(&staging.target), &dest)?,
                EntryKind::Symlink(original) => self.fs.symlink(original, &dest)?,
            }
        }
        Ok(skipped)
    }

    /// target -> backup, staging -> target, drop backup.
    fn swap(&self, staging: Staging) -> KilnResult<()> {
        let target = staging.target.clone();
        let backup = parent_of(&target).join(format!("{BACKUP_PREFIX}{}", Uuid::new_v4()));

        if let Err(e) = self.cancel.check() {
            return Err(self.abandon(staging, e.into()));
        }
        if let Err(e) = self.fs.rename(&target, &backup) {
            self.discard(staging);
            return Err(ApplicationError::PartialWriteRecovered {
                path: target,
                reason: e.to_string(),
            }
            .into());
        }

        let swapped = self
            .cancel
            .check()
            .map_err(KilnError::from)
            .and_then(|()| self.fs.rename(&staging.dir, &target));

        if let Err(e) = swapped {
            warn!(error = %e, "Publish failed; restoring previous directory");
            if let Err(restore) = self.fs.rename(&backup, &target) {
                return Err(ApplicationError::RollbackFailed {
                    path: target,
                    reason: format!(
                        "{e}; previous content left at {}: {restore}",
                        backup.display()
                    ),
                }
                .into());
            }
            self.discard(staging);
            return Err(match e {
                KilnError::Application(ApplicationError::Cancelled) => e,
                other => ApplicationError::PartialWriteRecovered {
                    path: target,
                    reason: other.to_string(),
                }
                .into(),
            });
        }

        if let Err(e) = self.fs.remove_dir_all(&backup) {
            warn!(backup = %backup.display(), error = %e, "Failed to remove backup directory");
        }
        Ok(())
    }

    fn abandon(&self, staging: Staging, error: KilnError) -> KilnError {
        self.discard(staging);
        error
    }
}

fn parent_of(target: &Path) -> PathBuf {
    match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{DiskFs, dir_entries, read, write};
    use crate::domain::FileToWrite;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn rel(s: &str) -> RelativePath {
        RelativePath::try_new(s).unwrap()
    }

    fn structure(files: &[(&str, &str)]) -> ProjectStructure {
        files
            .iter()
            .map(|(p, c)| FileToWrite::text(rel(p), *c))
            .collect()
    }

    fn publish(
        fs: &DiskFs,
        target: &Path,
        files: &[(&str, &str)],
        mode: OverwriteMode,
    ) -> KilnResult<PublishReport> {
        let cancel = CancellationToken::new();
        let writer = AtomicWriter::new(fs, &cancel);
        let staging = writer.stage(target)?;
        writer.write_structure(&staging, &structure(files))?;
        writer.publish(staging, mode, &[])
    }

    // ── fresh targets ────────────────────────────────────────────────────

    #[test]
    fn publishes_into_new_directory() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        let report = publish(
            &DiskFs::new(),
            &target,
            &[("README.md", "# demo\n"), ("src/main.rs", "fn main() {}\n")],
            OverwriteMode::Reject,
        )
        .unwrap();

        assert_eq!(report.written, vec![rel("README.md"), rel("src/main.rs")]);
        assert_eq!(read(&target, "src/main.rs"), "fn main() {}\n");
        assert_eq!(dir_entries(tmp.path()), vec!["demo"]);
    }

    #[test]
    fn empty_existing_directory_counts_as_new() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        std::fs::create_dir(&target).unwrap();
        publish(&DiskFs::new(), &target, &[("a.txt", "a")], OverwriteMode::Reject).unwrap();
        assert_eq!(read(&target, "a.txt"), "a");
    }

    // ── existing targets ─────────────────────────────────────────────────

    #[test]
    fn reject_leaves_existing_content_untouched() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        write(&target, "keep.txt", "mine");

        let err = publish(&DiskFs::new(), &target, &[("a.txt", "a")], OverwriteMode::Reject)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationConflict);
        assert_eq!(dir_entries(&target), vec!["keep.txt"]);
        assert_eq!(dir_entries(tmp.path()), vec!["demo"]);
    }

    #[test]
    fn skip_existing_keeps_user_files() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        write(&target, "README.md", "mine");
        write(&target, "notes.txt", "extra");

        let report = publish(
            &DiskFs::new(),
            &target,
            &[("README.md", "theirs"), ("src/lib.rs", "")],
            OverwriteMode::SkipExisting,
        )
        .unwrap();

        assert_eq!(read(&target, "README.md"), "mine");
        assert_eq!(read(&target, "notes.txt"), "extra");
        assert_eq!(read(&target, "src/lib.rs"), "");
        assert_eq!(report.skipped, vec![rel("README.md")]);
        assert_eq!(report.written, vec![rel("src/lib.rs")]);
    }

    #[test]
    fn overwrite_takes_rendered_content_and_keeps_the_rest() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        write(&target, "README.md", "mine");
        write(&target, "notes.txt", "extra");

        publish(&DiskFs::new(), &target, &[("README.md", "theirs")], OverwriteMode::Overwrite)
            .unwrap();
        assert_eq!(read(&target, "README.md"), "theirs");
        assert_eq!(read(&target, "notes.txt"), "extra");
        assert_eq!(dir_entries(tmp.path()), vec!["demo"]);
    }

    #[test]
    fn removals_are_not_carried_over() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        write(&target, "old.txt", "gone");
        write(&target, "keep.txt", "kept");

        let fs = DiskFs::new();
        let cancel = CancellationToken::new();
        let writer = AtomicWriter::new(&fs, &cancel);
        let staging = writer.stage(&target).unwrap();
        writer
            .write_structure(&staging, &structure(&[("new.txt", "n")]))
            .unwrap();
        writer
            .publish(staging, OverwriteMode::Overwrite, &[rel("old.txt")])
            .unwrap();
        assert_eq!(dir_entries(&target), vec!["keep.txt", "new.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn links_and_empty_directories_survive_publish() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        write(&target, "README.md", "mine");
        std::fs::create_dir_all(target.join("data/uploads")).unwrap();
        std::os::unix::fs::symlink("README.md", target.join("docs-link")).unwrap();

        publish(&DiskFs::new(), &target, &[("README.md", "theirs")], OverwriteMode::Overwrite)
            .unwrap();

        assert_eq!(read(&target, "README.md"), "theirs");
        assert!(target.join("data/uploads").is_dir());
        assert_eq!(
            std::fs::read_link(target.join("docs-link")).unwrap(),
            PathBuf::from("README.md")
        );
        assert_eq!(read(&target, "docs-link"), "theirs");
    }

    #[cfg(unix)]
    #[test]
    fn skip_existing_keeps_a_link_in_place_of_a_rendered_file() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        write(&target, "notes.txt", "mine");
        std::os::unix::fs::symlink("notes.txt", target.join("README.md")).unwrap();

        let report = publish(
            &DiskFs::new(),
            &target,
            &[("README.md", "theirs")],
            OverwriteMode::SkipExisting,
        )
        .unwrap();

        assert_eq!(report.skipped, vec![rel("README.md")]);
        assert!(std::fs::symlink_metadata(target.join("README.md"))
            .unwrap()
            .file_type()
            .is_symlink());
        assert_eq!(read(&target, "README.md"), "mine");
    }

    #[cfg(unix)]
    #[test]
    fn reject_counts_links_and_empty_directories_as_content() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        std::fs::create_dir_all(target.join("keep/empty")).unwrap();
        std::os::unix::fs::symlink("/etc/hostname", target.join("link")).unwrap();

        let err = publish(&DiskFs::new(), &target, &[("a.txt", "a")], OverwriteMode::Reject)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationConflict);
        assert!(target.join("keep/empty").is_dir());
        assert!(std::fs::symlink_metadata(target.join("link")).is_ok());
        assert_eq!(dir_entries(&target), vec!["keep", "link"]);
    }

    // ── failure paths ────────────────────────────────────────────────────

    #[test]
    fn failed_swap_restores_previous_tree() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        write(&target, "README.md", "original");

        // First rename moves target to backup; the second one fails.
        let fs = DiskFs::failing_rename(2);
        let err = publish(&fs, &target, &[("README.md", "new")], OverwriteMode::Overwrite)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PartialWriteRecovered);
        assert_eq!(read(&target, "README.md"), "original");
        assert_eq!(dir_entries(tmp.path()), vec!["demo"]);
        assert_eq!(fs.log.lock().unwrap().len(), 3);
    }

    #[test]
    fn failed_fresh_publish_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        let err = publish(
            &DiskFs::failing_rename(1),
            &target,
            &[("a.txt", "a")],
            OverwriteMode::Reject,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialWriteRecovered);
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[test]
    fn cancellation_before_swap_leaves_target_untouched() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("demo");
        write(&target, "README.md", "original");

        let fs = DiskFs::new();
        let cancel = CancellationToken::new();
        let writer = AtomicWriter::new(&fs, &cancel);
        let staging = writer.stage(&target).unwrap();
        writer
            .write_structure(&staging, &structure(&[("README.md", "new")]))
            .unwrap();
        cancel.cancel();

        let err = writer
            .publish(staging, OverwriteMode::Overwrite, &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(read(&target, "README.md"), "original");
        assert_eq!(dir_entries(tmp.path()), vec!["demo"]);
    }

    #[test]
    fn overwrite_mode_parses_kebab_case() {
        assert_eq!("skip-existing".parse::<OverwriteMode>(), Ok(OverwriteMode::SkipExisting));
        assert_eq!(OverwriteMode::Merge.to_string(), "merge");
        assert!("clobber".parse::<OverwriteMode>().is_err());
    }
}
