//! Conflict marker vocabulary shared by the merge and the resolution check.

/// Opens a conflict block; followed by the user's lines.
pub const OURS_MARKER: &str = "<<<<<<< USER";
/// Followed by the original template's lines.
pub const BASE_MARKER: &str = "||||||| ORIGINAL";
/// Followed by the new template's lines.
pub const SEPARATOR: &str = "=======";
/// Closes a conflict block.
pub const THEIRS_MARKER: &str = ">>>>>>> TEMPLATE";

/// Suffix of the file written next to a binary file whose merge failed.
pub const SIDECAR_SUFFIX: &str = ".kiln-template";

/// `true` if any line opens or closes a conflict block.
pub fn has_conflict_markers(text: &str) -> bool {
    text.lines()
        .any(|line| line.starts_with(OURS_MARKER) || line.starts_with(THEIRS_MARKER))
}

/// Number of conflict blocks opened in `text`.
pub fn count_conflicts(text: &str) -> usize {
    text.lines().filter(|line| line.starts_with(OURS_MARKER)).count()
}

/// `true` for `<file>.kiln-template` sidecars.
pub fn is_sidecar(path: &str) -> bool {
    path.ends_with(SIDECAR_SUFFIX)
}
