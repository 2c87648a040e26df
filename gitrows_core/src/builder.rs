use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use gitrows_api::{
    Branch, ChangeType, Commit, CommitStats, Diff, DiffContent, FileMod, FilemodId, Signature,
};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::parse::{
    CommitToken, FileDiffToken, FileModToken, GraphEntry, Malformed, ParseResult, SignatureToken,
};

const FILEMOD_ID_LEN: usize = 32;

/// Identifier of the change to `path_after` made by `commit_hash`.
///
/// The same path touched by different commits yields different ids. The id
/// hashes the path bytes git recorded, so paths that are not UTF-8 keep
/// distinct ids even when their display forms collide.
#[must_use]
pub fn filemod_id(commit_hash: &str, path_after: impl AsRef<[u8]>) -> FilemodId {
    let mut hasher = Sha256::new();
    hasher.update(commit_hash.as_bytes());
    hasher.update([0x1f]);
    hasher.update(path_after.as_ref());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(FILEMOD_ID_LEN);
    FilemodId::new(digest)
}

/// Parse a strict ISO 8601 timestamp, keeping its UTC offset.
///
/// # Errors
///
/// Returns [`Malformed`] when the text is not RFC 3339.
pub fn normalize_timestamp(raw: &str) -> ParseResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|err| Malformed(format!("invalid timestamp {raw:?}: {err}")))
}

/// Which branch first reaches each commit, walking from the default branch
/// before any other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reachability {
    owners: HashMap<String, usize>,
    branches: Vec<String>,
    default: Option<usize>,
}

impl Reachability {
    /// Walk parent edges from every branch tip.
    #[must_use]
    pub fn compute(graph: impl IntoIterator<Item = GraphEntry>, branches: &[Branch]) -> Self {
        let parents: HashMap<String, Vec<String>> = graph
            .into_iter()
            .map(|entry| (entry.hash, entry.parents))
            .collect();

        let mut ordered: Vec<&Branch> = branches.iter().collect();
        ordered.sort_by_key(|branch| !branch.is_default);

        let mut reachability = Self {
            owners: HashMap::with_capacity(parents.len()),
            branches: ordered.iter().map(|branch| branch.name.clone()).collect(),
            default: ordered
                .first()
                .filter(|branch| branch.is_default)
                .map(|_| 0),
        };

        for (index, branch) in ordered.iter().enumerate() {
            let mut stack = vec![branch.tip.clone()];
            while let Some(hash) = stack.pop() {
                if reachability.owners.contains_key(&hash) {
                    continue;
                }
                if let Some(next) = parents.get(&hash) {
                    stack.extend(next.iter().cloned());
                }
                reachability.owners.insert(hash, index);
            }
        }

        debug!(
            commits = reachability.owners.len(),
            branches = reachability.branches.len(),
            "computed branch reachability"
        );
        reachability
    }

    /// Whether the default branch reaches `commit_hash`.
    #[must_use]
    pub fn in_main(&self, commit_hash: &str) -> bool {
        self.default.is_some() && self.owners.get(commit_hash).copied() == self.default
    }

    /// Name of the branch that first reached `commit_hash`.
    #[must_use]
    pub fn source(&self, commit_hash: &str) -> Option<&str> {
        self.owners
            .get(commit_hash)
            .and_then(|index| self.branches.get(*index))
            .map(String::as_str)
    }

    /// Number of commits reached from any branch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether no branch reached any commit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Turns commit tokens into [`Commit`] records.
#[derive(Debug, Clone)]
pub struct CommitBuilder {
    reachability: Arc<Reachability>,
    with_stats: bool,
}

impl CommitBuilder {
    /// `with_stats` is false for metadata-only sessions, whose commits carry
    /// no change totals.
    #[must_use]
    pub const fn new(reachability: Arc<Reachability>, with_stats: bool) -> Self {
        Self {
            reachability,
            with_stats,
        }
    }

    /// Assemble one commit.
    ///
    /// # Errors
    ///
    /// Returns [`Malformed`] when a timestamp cannot be parsed.
    pub fn build(&self, token: CommitToken) -> ParseResult<Commit> {
        let stats = self.with_stats.then(|| {
            let shortstat = token.shortstat.unwrap_or_default();
            CommitStats {
                files_changed: shortstat.files_changed,
                lines_added: shortstat.insertions,
                lines_deleted: shortstat.deletions,
            }
        });
        Ok(Commit {
            in_main: self.reachability.in_main(&token.hash),
            source: self.reachability.source(&token.hash).map(str::to_string),
            author: signature(token.author)?,
            committer: signature(token.committer)?,
            commit_hash: token.hash,
            parents: token.parents,
            subject: token.subject,
            body: token.body,
            stats,
        })
    }
}

fn signature(token: SignatureToken) -> ParseResult<Signature> {
    Ok(Signature {
        date: normalize_timestamp(&token.date)?,
        name: token.name,
        email: token.email,
    })
}

/// Turns raw/numstat tokens into [`FileMod`] records.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileModBuilder;

impl FileModBuilder {
    /// Assemble one file modification of `commit_hash`.
    #[must_use]
    pub fn build(self, commit_hash: &str, token: FileModToken) -> FileMod {
        let change_type = ChangeType::from_status(token.status);
        let is_binary = token.is_binary();
        FileMod {
            filemod_id: filemod_id(commit_hash, &token.path_after),
            commit_hash: commit_hash.to_string(),
            similarity: token.similarity.filter(|_| change_type.is_rename_or_copy()),
            change_type,
            path_before: path_text(token.path_before),
            path_after: path_text(token.path_after),
            lines_added: token.added.unwrap_or(0),
            lines_deleted: token.deleted.unwrap_or(0),
            is_binary,
        }
    }
}

/// Turns per-file patch tokens into [`Diff`] records.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffBuilder;

impl DiffBuilder {
    /// Assemble the diff of one file in `commit_hash`.
    ///
    /// Returns `None` for changes without line data, such as mode-only
    /// changes or empty files.
    #[must_use]
    pub fn build(self, commit_hash: &str, token: FileDiffToken) -> Option<Diff> {
        let content = if token.is_binary {
            DiffContent::Binary
        } else if token.hunks.is_empty() {
            return None;
        } else {
            DiffContent::Text {
                hunks: token.hunks,
            }
        };
        Some(Diff {
            filemod_id: filemod_id(commit_hash, &token.path_after),
            commit_hash: commit_hash.to_string(),
            path_before: path_text(token.path_before),
            path_after: path_text(token.path_after),
            content,
        })
    }
}

/// Display form of a recorded path; bytes that are not UTF-8 become U+FFFD.
fn path_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}
