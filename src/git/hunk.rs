//! Zero-context line hunks between a reference text and the buffer.

use std::ops::Range;

use serde::Serialize;
use similar::{DiffTag, TextDiff};

/// Shape of a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HunkKind {
    /// Lines exist only in the buffer.
    Added,
    /// Lines were replaced.
    Modified,
    /// Lines exist only in the reference.
    Removed,
}

/// One contiguous change.
///
/// Ranges are 0-based line indices. An empty `current` range marks the
/// position in the buffer where removed lines used to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffHunk {
    pub kind: HunkKind,
    /// Lines in the reference text.
    pub original: Range<usize>,
    /// Lines in the buffer.
    pub current: Range<usize>,
    /// Reference lines replaced or removed by this hunk, without line endings.
    pub original_text: Vec<String>,
    /// Rolling back would be meaningless (the reference side is synthetic).
    pub suppress_rollback: bool,
}

/// Hunks of the buffer against the index and against `HEAD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub to_index: Vec<DiffHunk>,
    pub to_head: Vec<DiffHunk>,
}

impl DiffResult {
    /// Whether there are no changes against either reference.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_index.is_empty() && self.to_head.is_empty()
    }
}

/// Compute the hunks turning `original` into `current`.
#[must_use]
pub fn compute_hunks(original: &str, current: &str, suppress_rollback: bool) -> Vec<DiffHunk> {
    let diff = TextDiff::from_lines(original, current);
    let old_lines = diff.old_slices();

    let mut hunks = Vec::new();
    let mut open: Option<(Range<usize>, Range<usize>)> = None;

    for op in diff.ops() {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            if let Some((old, new)) = open.take() {
                hunks.push(hunk(old, new, old_lines, suppress_rollback));
            }
            continue;
        }

        open = Some(match open {
            Some((o, n)) => (o.start..old.end, n.start..new.end),
            None => (old, new),
        });
    }
    if let Some((old, new)) = open {
        hunks.push(hunk(old, new, old_lines, suppress_rollback));
    }

    hunks
}

fn hunk(
    original: Range<usize>,
    current: Range<usize>,
    old_lines: &[&str],
    suppress_rollback: bool,
) -> DiffHunk {
    let kind = if original.is_empty() {
        HunkKind::Added
    } else if current.is_empty() {
        HunkKind::Removed
    } else {
        HunkKind::Modified
    };
    let original_text = old_lines[original.clone()]
        .iter()
        .map(|line| line.trim_end_matches(['\r', '\n']).to_string())
        .collect();

    DiffHunk {
        kind,
        original,
        current,
        original_text,
        suppress_rollback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_have_no_hunks() {
        assert!(compute_hunks("a\nb\n", "a\nb\n", false).is_empty());
        assert!(compute_hunks("", "", false).is_empty());
    }

    #[test]
    fn test_added_lines() {
        let hunks = compute_hunks("a\nc\n", "a\nb\nc\n", false);
        assert_eq!(
            hunks,
            vec![DiffHunk {
                kind: HunkKind::Added,
                original: 1..1,
                current: 1..2,
                original_text: vec![],
                suppress_rollback: false,
            }]
        );
    }

    #[test]
    fn test_removed_lines() {
        let hunks = compute_hunks("a\nb\nc\n", "a\nc\n", false);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].kind, HunkKind::Removed);
        assert_eq!(hunks[0].original, 1..2);
        assert_eq!(hunks[0].current, 1..1);
        assert_eq!(hunks[0].original_text, vec!["b".to_string()]);
    }

    #[test]
    fn test_modified_lines() {
        let hunks = compute_hunks("a\nb\nc\n", "a\nB\nc\n", false);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].kind, HunkKind::Modified);
        assert_eq!(hunks[0].original, 1..2);
        assert_eq!(hunks[0].current, 1..2);
        assert_eq!(hunks[0].original_text, vec!["b".to_string()]);
    }

    #[test]
    fn test_separate_changes_make_separate_hunks() {
        let original = "1\n2\n3\n4\n5\n";
        let current = "1\nx\n3\n4\n5\ny\n";
        let hunks = compute_hunks(original, current, false);

        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].kind, HunkKind::Modified);
        assert_eq!(hunks[1].kind, HunkKind::Added);
        assert_eq!(hunks[1].current, 5..6);
    }

    #[test]
    fn test_new_file_is_one_added_hunk() {
        let hunks = compute_hunks("", "a\nb\n", true);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].kind, HunkKind::Added);
        assert_eq!(hunks[0].current, 0..2);
        assert!(hunks[0].suppress_rollback);
    }

    #[test]
    fn test_crlf_is_stripped_from_original_text() {
        let hunks = compute_hunks("a\r\nb\r\n", "a\r\n", false);
        assert_eq!(hunks[0].original_text, vec!["b".to_string()]);
    }

    #[test]
    fn test_result_serializes_as_json() {
        let result = DiffResult {
            to_index: vec![],
            to_head: compute_hunks("a\n", "b\n", false),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["to_head"][0]["kind"], "modified");
        assert_eq!(json["to_head"][0]["original"]["start"], 0);
        assert_eq!(json["to_head"][0]["original"]["end"], 1);
        assert!(!result.is_empty());
    }
}
