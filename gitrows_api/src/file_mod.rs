use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{Field, FieldType, Record, RecordKind, Row};

/// Synthetic identifier joining a [`FileMod`] with its [`crate::Diff`].
///
/// Derived from the owning commit hash and the post-change path, so every
/// commit's touch of a file is a distinct record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilemodId(String);

impl FilemodId {
    /// Wrap an already-derived identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilemodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a file changed within a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// File only exists after the commit.
    Added,
    /// File only exists before the commit.
    Deleted,
    /// Content or mode changed in place.
    Modified,
    /// Path changed, content similar above the rename threshold.
    Renamed,
    /// New path created from an existing file's content.
    Copied,
    /// Object type changed (e.g. regular file to symlink).
    TypeChanged,
    /// Unresolved merge entry.
    Unmerged,
    /// Status letter not recognised.
    Unknown,
}

impl ChangeType {
    /// Map a diff status letter (`A`, `D`, `M`, `R`, `C`, `T`, `U`).
    #[must_use]
    pub const fn from_status(status: char) -> Self {
        match status {
            'A' => Self::Added,
            'D' => Self::Deleted,
            'M' => Self::Modified,
            'R' => Self::Renamed,
            'C' => Self::Copied,
            'T' => Self::TypeChanged,
            'U' => Self::Unmerged,
            _ => Self::Unknown,
        }
    }

    /// Whether the change pairs two different paths.
    #[must_use]
    pub const fn is_rename_or_copy(self) -> bool {
        matches!(self, Self::Renamed | Self::Copied)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
            Self::Renamed => "renamed",
            Self::Copied => "copied",
            Self::TypeChanged => "type_changed",
            Self::Unmerged => "unmerged",
            Self::Unknown => "unknown",
        }
    }
}

/// A single file's change record within one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMod {
    /// Join key shared with the file's diff.
    pub filemod_id: FilemodId,
    /// Hash of the owning commit.
    pub commit_hash: String,
    /// Path before the commit.
    pub path_before: String,
    /// Path after the commit. Equal to `path_before` unless renamed or copied.
    pub path_after: String,
    /// Classification of the change.
    pub change_type: ChangeType,
    /// Similarity index (0-100) for renames and copies.
    #[serde(default)]
    pub similarity: Option<u8>,
    /// Number of added lines. Zero for binary files.
    pub lines_added: u32,
    /// Number of deleted lines. Zero for binary files.
    pub lines_deleted: u32,
    /// Whether git treated the content as binary.
    #[serde(default)]
    pub is_binary: bool,
}

const FILE_MOD_FIELDS: &[Field] = &[
    Field::required("filemod_id", FieldType::Text),
    Field::required("commit_hash", FieldType::Text),
    Field::required("path_before", FieldType::Text),
    Field::required("path_after", FieldType::Text),
    Field::required("change_type", FieldType::Text),
    Field::nullable("similarity", FieldType::Integer),
    Field::required("lines_added", FieldType::Integer),
    Field::required("lines_deleted", FieldType::Integer),
    Field::required("is_binary", FieldType::Boolean),
];

impl Record for FileMod {
    const KIND: RecordKind = RecordKind::FileMod;

    fn fields() -> &'static [Field] {
        FILE_MOD_FIELDS
    }

    fn to_row(&self) -> Row {
        let mut row = Row::with_capacity(FILE_MOD_FIELDS.len());
        row.push("filemod_id", self.filemod_id.as_str());
        row.push("commit_hash", self.commit_hash.as_str());
        row.push("path_before", self.path_before.as_str());
        row.push("path_after", self.path_after.as_str());
        row.push("change_type", self.change_type.as_str());
        row.push("similarity", self.similarity);
        row.push("lines_added", self.lines_added);
        row.push("lines_deleted", self.lines_deleted);
        row.push("is_binary", self.is_binary);
        row
    }
}
