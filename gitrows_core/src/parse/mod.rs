//! Output parsers: plumbing bytes in, tokens out.
//!
//! Parsers are pure functions over one record at a time. They never touch the
//! subprocess; record offsets and ordinals for error reporting are attached by
//! the extractor that drives them. Body parsers report positions within the
//! body as [`Located`].

/// Commit and parent-graph records.
pub mod commits;
/// Patch text.
pub mod diffs;
/// Raw status plus numstat entries.
pub mod file_mods;
/// Branch and tag listings.
pub mod refs;

mod quote;

use std::fmt;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::git::UNIT_SEPARATOR;

pub use commits::{CommitToken, GraphEntry, ShortStat, SignatureToken};
pub use diffs::FileDiffToken;
pub use file_mods::FileModToken;

/// Why a record could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Malformed(pub String);

impl Malformed {
    /// Describe the defect.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    /// The description.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of parsing one record.
pub type ParseResult<T> = std::result::Result<T, Malformed>;

/// A defect inside a body of many entries, with where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// Byte offset of the failing entry within the body.
    pub offset: usize,
    /// Entries parsed before the failure.
    pub parsed: usize,
    /// What was wrong.
    pub reason: Malformed,
}

impl Located {
    pub(crate) const fn new(offset: usize, parsed: usize, reason: Malformed) -> Self {
        Self {
            offset,
            parsed,
            reason,
        }
    }
}

impl From<Located> for Malformed {
    fn from(located: Located) -> Self {
        located.reason
    }
}

/// Decode `bytes` as UTF-8 or report which part of the record was invalid.
pub(crate) fn utf8<'a>(bytes: &'a [u8], what: &str) -> ParseResult<&'a str> {
    std::str::from_utf8(bytes).map_err(|err| Malformed(format!("{what} is not UTF-8: {err}")))
}

/// Split a record into at most `limit` unit-separated fields.
pub(crate) fn fields(bytes: &[u8], limit: usize) -> Vec<&[u8]> {
    bytes.splitn(limit, |b| *b == UNIT_SEPARATOR).collect()
}

/// Split a record at its header hash, returning the hash and the rest.
pub(crate) fn split_hash(bytes: &[u8]) -> ParseResult<(String, &[u8])> {
    let end = bytes
        .iter()
        .position(|&b| matches!(b, b'\0' | b'\n' | UNIT_SEPARATOR))
        .unwrap_or(bytes.len());
    let hash = &bytes[..end];
    if !crate::git::is_object_hash(hash) {
        return Err(Malformed::new("record does not start with a commit hash"));
    }
    Ok((utf8(hash, "commit hash")?.to_string(), &bytes[end..]))
}

/// Compile `source` into `cell` on first use.
pub(crate) fn pattern(
    cell: &'static OnceCell<Regex>,
    source: &str,
) -> ParseResult<&'static Regex> {
    cell.get_or_try_init(|| Regex::new(source))
        .map_err(|err| Malformed(format!("invalid pattern {source:?}: {err}")))
}
