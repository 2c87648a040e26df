use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::record::{Field, FieldType, Record, RecordKind, Row};

/// Structured author/committer identity with the original UTC offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Display name for the individual.
    pub name: String,
    /// Email address as recorded in the commit.
    pub email: String,
    /// Timestamp in the offset the signer recorded.
    pub date: DateTime<FixedOffset>,
}

impl Signature {
    /// ISO 8601 rendering that keeps the recorded offset, e.g.
    /// `2024-03-01T09:30:00+02:00`.
    #[must_use]
    pub fn iso_date(&self) -> String {
        self.date.to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

/// Aggregate change counts for a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommitStats {
    /// Number of files touched.
    pub files_changed: u32,
    /// Number of inserted lines.
    pub lines_added: u32,
    /// Number of deleted lines.
    pub lines_deleted: u32,
}

/// A commit in the repository history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full object identifier.
    pub commit_hash: String,
    /// Parent hashes in recorded order. Empty for root commits.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Whether the commit is reachable from the default branch tip.
    pub in_main: bool,
    /// First branch (default branch first) whose history contains the commit.
    #[serde(default)]
    pub source: Option<String>,
    /// Who wrote the change.
    pub author: Signature,
    /// Who recorded the change.
    pub committer: Signature,
    /// First paragraph of the message.
    pub subject: String,
    /// Remainder of the message after the first blank line.
    #[serde(default)]
    pub body: String,
    /// Aggregate counts; `None` when the session was acquired without blobs.
    #[serde(default)]
    pub stats: Option<CommitStats>,
}

impl Commit {
    /// Whether the commit has two or more parents.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Whether the commit has no parents.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Number of files changed.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] when stats were not fetched.
    pub fn files_changed(&self) -> Result<u32, FilterError> {
        self.require_stats("files_changed").map(|stats| stats.files_changed)
    }

    /// Number of lines inserted.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] when stats were not fetched.
    pub fn lines_added(&self) -> Result<u32, FilterError> {
        self.require_stats("lines_added").map(|stats| stats.lines_added)
    }

    /// Number of lines deleted.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] when stats were not fetched.
    pub fn lines_deleted(&self) -> Result<u32, FilterError> {
        self.require_stats("lines_deleted").map(|stats| stats.lines_deleted)
    }

    fn require_stats(&self, field: &'static str) -> Result<CommitStats, FilterError> {
        self.stats.ok_or(FilterError::new(field))
    }
}

const COMMIT_FIELDS: &[Field] = &[
    Field::required("commit_hash", FieldType::Text),
    Field::required("parents", FieldType::TextList),
    Field::required("is_merge", FieldType::Boolean),
    Field::required("in_main", FieldType::Boolean),
    Field::nullable("source", FieldType::Text),
    Field::required("author_name", FieldType::Text),
    Field::required("author_email", FieldType::Text),
    Field::required("author_date", FieldType::Timestamp),
    Field::required("committer_name", FieldType::Text),
    Field::required("committer_email", FieldType::Text),
    Field::required("committer_date", FieldType::Timestamp),
    Field::required("subject", FieldType::Text),
    Field::required("body", FieldType::Text),
    Field::nullable("files_changed", FieldType::Integer),
    Field::nullable("lines_added", FieldType::Integer),
    Field::nullable("lines_deleted", FieldType::Integer),
];

impl Record for Commit {
    const KIND: RecordKind = RecordKind::Commit;

    fn fields() -> &'static [Field] {
        COMMIT_FIELDS
    }

    fn to_row(&self) -> Row {
        let mut row = Row::with_capacity(COMMIT_FIELDS.len());
        row.push("commit_hash", self.commit_hash.as_str());
        row.push("parents", self.parents.clone());
        row.push("is_merge", self.is_merge());
        row.push("in_main", self.in_main);
        row.push("source", self.source.clone());
        row.push("author_name", self.author.name.as_str());
        row.push("author_email", self.author.email.as_str());
        row.push("author_date", self.author.iso_date());
        row.push("committer_name", self.committer.name.as_str());
        row.push("committer_email", self.committer.email.as_str());
        row.push("committer_date", self.committer.iso_date());
        row.push("subject", self.subject.as_str());
        row.push("body", self.body.as_str());
        row.push("files_changed", self.stats.map(|s| s.files_changed));
        row.push("lines_added", self.stats.map(|s| s.lines_added));
        row.push("lines_deleted", self.stats.map(|s| s.lines_deleted));
        row
    }
}
