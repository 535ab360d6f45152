//! Three-way merge for template upgrades.

mod diff3;
mod markers;
mod state;

pub use diff3::{ConflictRegion, MergeResult, merge3};
pub use markers::{
    BASE_MARKER, OURS_MARKER, SEPARATOR, SIDECAR_SUFFIX, THEIRS_MARKER, count_conflicts,
    has_conflict_markers, is_sidecar,
};
pub use state::{FileUpdate, FileUpdateState};
