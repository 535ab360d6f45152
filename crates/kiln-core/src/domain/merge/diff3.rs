//! Line-based three-way merge.
//!
//! Both sides are diffed against the base. Changes whose base ranges overlap
//! (or that insert at the same point) form a cluster; a cluster touched by
//! one side takes that side, a cluster touched by both sides takes the
//! shared text when the sides agree and becomes a conflict block otherwise.

use std::ops::Range;

use serde::Serialize;
use similar::{Algorithm, DiffTag, capture_diff_slices};

use super::markers::{BASE_MARKER, OURS_MARKER, SEPARATOR, THEIRS_MARKER};

/// A conflicting region in merged output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRegion {
    /// 1-based line of the opening marker.
    pub start_line: usize,
    /// 1-based line of the closing marker.
    pub end_line: usize,
    pub ours: String,
    pub base: String,
    pub theirs: String,
}

/// Outcome of merging one text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    Clean(String),
    Conflicted {
        content: String,
        regions: Vec<ConflictRegion>,
    },
}

impl MergeResult {
    pub fn content(&self) -> &str {
        match self {
            Self::Clean(content) | Self::Conflicted { content, .. } => content,
        }
    }

    pub fn into_content(self) -> String {
        match self {
            Self::Clean(content) | Self::Conflicted { content, .. } => content,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }

    pub fn regions(&self) -> &[ConflictRegion] {
        match self {
            Self::Clean(_) => &[],
            Self::Conflicted { regions, .. } => regions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Ours,
    Theirs,
}

#[derive(Debug, Clone)]
struct Hunk {
    side: Side,
    base: Range<usize>,
    replacement: Range<usize>,
}

/// Non-equal diff ops against `base`; a delete directly followed by an
/// insert becomes one replacement hunk.
fn hunks(base: &[&str], other: &[&str], side: Side) -> Vec<Hunk> {
    let mut out: Vec<Hunk> = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, base, other) {
        let (tag, base_range, replacement) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        if let Some(prev) = out.last_mut() {
            if prev.base.end == base_range.start && prev.replacement.end == replacement.start {
                prev.base.end = base_range.end;
                prev.replacement.end = replacement.end;
                continue;
            }
        }
        out.push(Hunk {
            side,
            base: base_range,
            replacement,
        });
    }
    out
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    (a.start < b.end && b.start < a.end) || (a.is_empty() && b.is_empty() && a.start == b.start)
}

/// Merge `ours` and `theirs`, both derived from `base`.
pub fn merge3(base: &str, ours: &str, theirs: &str) -> MergeResult {
    if ours == theirs || base == theirs {
        return MergeResult::Clean(ours.to_string());
    }
    if base == ours {
        return MergeResult::Clean(theirs.to_string());
    }

    let base_lines: Vec<&str> = base.split_inclusive('\n').collect();
    let ours_lines: Vec<&str> = ours.split_inclusive('\n').collect();
    let theirs_lines: Vec<&str> = theirs.split_inclusive('\n').collect();

    let mut all = hunks(&base_lines, &ours_lines, Side::Ours);
    all.extend(hunks(&base_lines, &theirs_lines, Side::Theirs));
    all.sort_by_key(|h| (h.base.start, h.base.end));

    let newline = if [base, ours, theirs].iter().any(|t| t.contains("\r\n")) {
        "\r\n"
    } else {
        "\n"
    };

    let mut out = Output::new(newline);
    let mut regions = Vec::new();
    let mut pos = 0;
    let mut i = 0;

    while i < all.len() {
        let mut span = all[i].base.clone();
        let mut j = i + 1;
        while j < all.len() && overlaps(&span, &all[j].base) {
            span.end = span.end.max(all[j].base.end);
            j += 1;
        }
        let cluster = &all[i..j];

        out.push_lines(&base_lines[pos..span.start]);

        let side_text = |side: Side, lines: &[&str]| -> String {
            let mut text = String::new();
            let mut cursor = span.start;
            for h in cluster.iter().filter(|h| h.side == side) {
                text.extend(base_lines[cursor..h.base.start].iter().copied());
                text.extend(lines[h.replacement.clone()].iter().copied());
                cursor = h.base.end;
            }
            text.extend(base_lines[cursor..span.end].iter().copied());
            text
        };

        let touches = |side: Side| cluster.iter().any(|h| h.side == side);
        match (touches(Side::Ours), touches(Side::Theirs)) {
            (true, false) => out.push_str(&side_text(Side::Ours, &ours_lines)),
            (false, true) => out.push_str(&side_text(Side::Theirs, &theirs_lines)),
            _ => {
                let mine = side_text(Side::Ours, &ours_lines);
                let upstream = side_text(Side::Theirs, &theirs_lines);
                if mine == upstream {
                    out.push_str(&mine);
                } else {
                    let original: String = base_lines[span.clone()].concat();
                    regions.push(out.push_conflict(mine, original, upstream));
                }
            }
        }

        pos = span.end;
        i = j;
    }
    out.push_lines(&base_lines[pos..]);

    if regions.is_empty() {
        MergeResult::Clean(out.text)
    } else {
        MergeResult::Conflicted {
            content: out.text,
            regions,
        }
    }
}

struct Output {
    text: String,
    newline: &'static str,
}

impl Output {
    fn new(newline: &'static str) -> Self {
        Self {
            text: String::new(),
            newline,
        }
    }

    fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
    }

    fn push_lines(&mut self, lines: &[&str]) {
        for line in lines {
            self.text.push_str(line);
        }
    }

    fn end_line(&mut self) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push_str(self.newline);
        }
    }

    fn line_count(&self) -> usize {
        self.text.matches('\n').count()
    }

    fn push_section(&mut self, marker: &str, body: &str) {
        self.end_line();
        self.text.push_str(marker);
        self.text.push_str(self.newline);
        self.text.push_str(body);
    }

    fn push_conflict(&mut self, ours: String, base: String, theirs: String) -> ConflictRegion {
        self.end_line();
        let start_line = self.line_count() + 1;
        self.push_section(OURS_MARKER, &ours);
        self.push_section(BASE_MARKER, &base);
        self.push_section(SEPARATOR, &theirs);
        self.end_line();
        let end_line = self.line_count() + 1;
        self.text.push_str(THEIRS_MARKER);
        self.text.push_str(self.newline);

        ConflictRegion {
            start_line,
            end_line,
            ours,
            base,
            theirs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::merge::has_conflict_markers;

    #[test]
    fn same_line_changed_on_both_sides_conflicts() {
        let result = merge3("a\nb\nc\n", "a\nB-user\nc\n", "a\nB-template\nc\n");
        let MergeResult::Conflicted { content, regions } = result else {
            panic!("expected a conflict");
        };
        assert_eq!(
            content,
            "a\n<<<<<<< USER\nB-user\n||||||| ORIGINAL\nb\n=======\nB-template\n>>>>>>> TEMPLATE\nc\n"
        );
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].start_line, regions[0].end_line), (2, 8));
        assert_eq!(regions[0].ours, "B-user\n");
        assert_eq!(regions[0].base, "b\n");
        assert_eq!(regions[0].theirs, "B-template\n");
    }

    #[test]
    fn adjacent_changes_merge_cleanly() {
        let result = merge3("a\nb\nc\n", "a\nB-user\nc\n", "a\nb\nC-template\n");
        assert_eq!(result, MergeResult::Clean("a\nB-user\nC-template\n".into()));
    }

    #[test]
    fn one_sided_changes_are_applied() {
        assert_eq!(merge3("a\n", "a\n", "a\nb\n").content(), "a\nb\n");
        assert_eq!(merge3("a\n", "x\na\n", "a\n").content(), "x\na\n");
    }

    #[test]
    fn identical_changes_do_not_conflict() {
        let base = "one\ntwo\nthree\nfour\n";
        let ours = "one\n2\nthree\nfour\nfive\n";
        let theirs = "one\n2\nthree\n4\n";
        assert_eq!(
            merge3(base, ours, theirs),
            MergeResult::Clean("one\n2\nthree\n4\nfive\n".into())
        );
    }

    #[test]
    fn inserts_at_same_point_conflict() {
        let result = merge3("a\nz\n", "a\nuser\nz\n", "a\ntemplate\nz\n");
        assert!(!result.is_clean());
        assert!(has_conflict_markers(result.content()));
    }

    #[test]
    fn merging_twice_with_the_same_template_is_stable() {
        let base = "fn main() {}\n";
        let theirs = "fn main() {\n    run();\n}\n";
        let ours = "// mine\nfn main() {}\n";
        let first = merge3(base, ours, theirs).into_content();
        assert_eq!(merge3(theirs, &first, theirs).into_content(), first);
    }

    #[test]
    fn missing_final_newline_still_yields_well_formed_markers() {
        let result = merge3("x", "user", "template");
        assert_eq!(
            result.content(),
            "<<<<<<< USER\nuser\n||||||| ORIGINAL\nx\n=======\ntemplate\n>>>>>>> TEMPLATE\n"
        );
    }

    #[test]
    fn crlf_content_keeps_crlf_markers() {
        let result = merge3("a\r\nb\r\n", "a\r\nx\r\n", "a\r\ny\r\n");
        assert!(result.content().contains("<<<<<<< USER\r\n"));
        assert!(result.content().contains(">>>>>>> TEMPLATE\r\n"));
    }
}
