use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::file_mod::FilemodId;
use crate::record::{Field, FieldType, Record, RecordKind, Row};

/// Line-level changes for one file in one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    /// Identifier of the owning file modification.
    pub filemod_id: FilemodId,
    /// Hash of the owning commit.
    pub commit_hash: String,
    /// Path before the commit.
    pub path_before: String,
    /// Path after the commit.
    pub path_after: String,
    /// Hunks, or a marker that the content is binary.
    pub content: DiffContent,
}

impl Diff {
    /// Whether the diff carries a binary marker instead of hunks.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self.content, DiffContent::Binary)
    }

    /// Hunks of a text diff. Empty for binary content.
    #[must_use]
    pub fn hunks(&self) -> &[DiffHunk] {
        match &self.content {
            DiffContent::Text { hunks } => hunks,
            DiffContent::Binary => &[],
        }
    }

    /// Lines added across all hunks.
    #[must_use]
    pub fn lines_added(&self) -> u32 {
        self.stats().additions
    }

    /// Lines deleted across all hunks.
    #[must_use]
    pub fn lines_deleted(&self) -> u32 {
        self.stats().deletions
    }

    /// Added/deleted line totals across all hunks.
    #[must_use]
    pub fn stats(&self) -> DiffStats {
        self.hunks()
            .iter()
            .map(DiffHunk::stats)
            .fold(DiffStats::ZERO, DiffStats::add)
    }
}

/// Body of a file diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffContent {
    /// Textual changes split into hunks.
    Text {
        /// Hunks in file order.
        hunks: Vec<DiffHunk>,
    },
    /// Git reported the file as binary; no line data exists.
    Binary,
}

/// Summary information about the changes within a file diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiffStats {
    /// Number of added lines.
    pub additions: u32,
    /// Number of removed lines.
    pub deletions: u32,
}

impl DiffStats {
    /// A stats instance with zero additions and deletions.
    pub const ZERO: Self = Self {
        additions: 0,
        deletions: 0,
    };

    /// Convenience constructor for explicit values.
    #[must_use]
    pub const fn new(additions: u32, deletions: u32) -> Self {
        Self {
            additions,
            deletions,
        }
    }

    /// Combine two stats structs.
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self {
            additions: self.additions + other.additions,
            deletions: self.deletions + other.deletions,
        }
    }
}

/// A diff hunk containing a contiguous set of changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    /// The range header describing the hunk offsets.
    pub range: DiffRange,
    /// Optional section header (e.g., function signature) after the `@@` marker.
    #[serde(default)]
    pub section: Option<String>,
    /// Line-level changes inside the hunk.
    #[serde(default)]
    pub lines: Vec<DiffLine>,
}

impl DiffHunk {
    /// Count added and deleted lines.
    #[must_use]
    pub fn stats(&self) -> DiffStats {
        self.lines.iter().fold(DiffStats::ZERO, |acc, line| match line.kind {
            DiffLineKind::Addition => acc.add(DiffStats::new(1, 0)),
            DiffLineKind::Deletion => acc.add(DiffStats::new(0, 1)),
            DiffLineKind::Context => acc,
        })
    }

    /// Text of added lines in order.
    pub fn additions(&self) -> impl Iterator<Item = &str> {
        self.lines_of(DiffLineKind::Addition)
    }

    /// Text of deleted lines in order.
    pub fn deletions(&self) -> impl Iterator<Item = &str> {
        self.lines_of(DiffLineKind::Deletion)
    }

    fn lines_of(&self, kind: DiffLineKind) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(move |line| line.kind == kind)
            .map(|line| line.text.as_str())
    }
}

/// The line number ranges referenced by a hunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRange {
    /// Starting line number in the old file.
    pub old_start: u32,
    /// Number of lines covered in the old file.
    pub old_lines: u32,
    /// Starting line number in the new file.
    pub new_start: u32,
    /// Number of lines covered in the new file.
    pub new_lines: u32,
}

/// A single line within a diff hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    /// The role the line plays in the diff (context, addition, deletion).
    pub kind: DiffLineKind,
    /// Text of the line without the diff marker or newline.
    pub text: String,
    /// 1-based line number in the old file if applicable.
    #[serde(default)]
    pub old_line: Option<u32>,
    /// 1-based line number in the new file if applicable.
    #[serde(default)]
    pub new_line: Option<u32>,
}

/// Type of a line contained in a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    /// Unchanged context line.
    Context,
    /// A newly added line.
    Addition,
    /// A deleted line.
    Deletion,
}

const DIFF_FIELDS: &[Field] = &[
    Field::required("filemod_id", FieldType::Text),
    Field::required("commit_hash", FieldType::Text),
    Field::required("path_before", FieldType::Text),
    Field::required("path_after", FieldType::Text),
    Field::required("is_binary", FieldType::Boolean),
    Field::required("lines_added", FieldType::Integer),
    Field::required("lines_deleted", FieldType::Integer),
    Field::required("hunks", FieldType::Nested),
];

impl Record for Diff {
    const KIND: RecordKind = RecordKind::Diff;

    fn fields() -> &'static [Field] {
        DIFF_FIELDS
    }

    fn to_row(&self) -> Row {
        let stats = self.stats();
        let hunks = serde_json::to_value(self.hunks()).unwrap_or(Value::Array(Vec::new()));
        let mut row = Row::with_capacity(DIFF_FIELDS.len());
        row.push("filemod_id", self.filemod_id.as_str());
        row.push("commit_hash", self.commit_hash.as_str());
        row.push("path_before", self.path_before.as_str());
        row.push("path_after", self.path_after.as_str());
        row.push("is_binary", self.is_binary());
        row.push("lines_added", stats.additions);
        row.push("lines_deleted", stats.deletions);
        row.push("hunks", hunks);
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::assert_row_matches_fields;

    fn sample_hunk() -> DiffHunk {
        DiffHunk {
            range: DiffRange {
                old_start: 10,
                old_lines: 1,
                new_start: 10,
                new_lines: 2,
            },
            section: Some("fn example()".into()),
            lines: vec![
                DiffLine {
                    kind: DiffLineKind::Deletion,
                    text: "    println!(\"old\");".into(),
                    old_line: Some(10),
                    new_line: None,
                },
                DiffLine {
                    kind: DiffLineKind::Addition,
                    text: "    println!(\"new\");".into(),
                    old_line: None,
                    new_line: Some(10),
                },
                DiffLine {
                    kind: DiffLineKind::Addition,
                    text: "    println!(\"more\");".into(),
                    old_line: None,
                    new_line: Some(11),
                },
            ],
        }
    }

    fn sample_diff(content: DiffContent) -> Diff {
        Diff {
            filemod_id: FilemodId::new("0f0f"),
            commit_hash: "2222222222222222222222222222222222222222".into(),
            path_before: "src/lib.rs".into(),
            path_after: "src/lib.rs".into(),
            content,
        }
    }

    #[test]
    fn stats_sum_hunk_lines() {
        let diff = sample_diff(DiffContent::Text {
            hunks: vec![sample_hunk(), sample_hunk()],
        });
        assert_eq!(diff.stats(), DiffStats::new(4, 2));
        assert_eq!(diff.hunks()[0].additions().count(), 2);
        assert_eq!(
            diff.hunks()[0].deletions().collect::<Vec<_>>(),
            vec!["    println!(\"old\");"]
        );
    }

    #[test]
    fn binary_diff_is_distinct_from_empty_text() {
        let binary = sample_diff(DiffContent::Binary);
        let empty = sample_diff(DiffContent::Text { hunks: Vec::new() });
        assert!(binary.is_binary());
        assert!(!empty.is_binary());
        assert_ne!(binary, empty);
        assert_eq!(binary.stats(), DiffStats::ZERO);
    }

    #[test]
    fn content_is_tagged_by_kind() {
        let json = serde_json::to_string(&DiffContent::Binary).expect("serialize content");
        assert_eq!(json, r#"{"kind":"binary"}"#);

        let text: DiffContent =
            serde_json::from_str(r#"{"kind":"text","hunks":[]}"#).expect("deserialize content");
        assert_eq!(text, DiffContent::Text { hunks: Vec::new() });
    }

    #[test]
    fn diff_stats_add() {
        let aggregate = DiffStats::new(5, 3).add(DiffStats::new(2, 4));
        assert_eq!(
            aggregate,
            DiffStats {
                additions: 7,
                deletions: 7
            }
        );
    }

    #[test]
    fn row_matches_field_contract() {
        let diff = sample_diff(DiffContent::Text {
            hunks: vec![sample_hunk()],
        });
        assert_row_matches_fields(&diff);
        let row = diff.to_row();
        assert_eq!(row.get("lines_added"), Some(&Value::from(2)));
        let hunks = row.get("hunks").and_then(Value::as_array).expect("hunks array");
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0]["range"]["new_lines"], Value::from(2));
    }
}
