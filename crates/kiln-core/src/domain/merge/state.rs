//! Per-file update state machine.

use serde::Serialize;

use crate::domain::{DomainError, RelativePath};

/// Where one file stands during an update.
///
/// ```text
/// Unchanged ──► CleanMerge
///     │
///     ├──► Conflicted ──► UserResolving ──► Resolved
///     │
///     └──► Added | Removed | RemovedFlagged | KeptLocal | TookTemplate
///          MergeFailed ──► UserResolving
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileUpdateState {
    Unchanged,
    CleanMerge,
    Conflicted,
    UserResolving,
    Resolved,
    /// New in the template; written.
    Added,
    /// Dropped by the template but kept because the user changed it or
    /// deletion was not requested.
    RemovedFlagged,
    /// Dropped by the template and deleted.
    Removed,
    /// User content kept under the keep-local strategy.
    KeptLocal,
    /// Template content taken under the take-template strategy.
    TookTemplate,
    /// Binary file changed on both sides; template copy written as a sidecar.
    MergeFailed,
}

impl FileUpdateState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::CleanMerge => "clean_merge",
            Self::Conflicted => "conflicted",
            Self::UserResolving => "user_resolving",
            Self::Resolved => "resolved",
            Self::Added => "added",
            Self::RemovedFlagged => "removed_flagged",
            Self::Removed => "removed",
            Self::KeptLocal => "kept_local",
            Self::TookTemplate => "took_template",
            Self::MergeFailed => "merge_failed",
        }
    }

    fn allows(self, to: Self) -> bool {
        use FileUpdateState::*;
        matches!(
            (self, to),
            (
                Unchanged,
                CleanMerge
                    | Conflicted
                    | Added
                    | Removed
                    | RemovedFlagged
                    | KeptLocal
                    | TookTemplate
                    | MergeFailed
            ) | (Conflicted | MergeFailed, UserResolving)
                | (UserResolving, Resolved)
        )
    }

    /// States an update can finish in without leaving work for the user.
    pub fn is_terminal_success(self) -> bool {
        !matches!(
            self,
            Self::Conflicted | Self::UserResolving | Self::MergeFailed
        )
    }

    /// States that leave markers or a sidecar in the tree.
    pub fn needs_resolution(self) -> bool {
        matches!(self, Self::Conflicted | Self::MergeFailed)
    }
}

/// One file's progress through an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileUpdate {
    pub path: RelativePath,
    pub state: FileUpdateState,
}

impl FileUpdate {
    pub fn new(path: RelativePath) -> Self {
        Self {
            path,
            state: FileUpdateState::Unchanged,
        }
    }

    /// Move to `to`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, to: FileUpdateState) -> Result<(), DomainError> {
        if !self.state.allows(to) {
            return Err(DomainError::IllegalTransition {
                path: self.path.to_string(),
                from: self.state.name(),
                to: to.name(),
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn with_state(mut self, to: FileUpdateState) -> Result<Self, DomainError> {
        self.advance(to)?;
        Ok(self)
    }
}
