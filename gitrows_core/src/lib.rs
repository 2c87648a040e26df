//! Extraction engine that mines git history into relational records.
//!
//! The crate is layered along the path data takes through it:
//! - a [`repository::Session`] owns a transient bare clone of the source
//! - the [`git`] invoker streams plumbing output from that clone
//! - [`parse`] turns the byte stream into tokens, [`builder`] into records
//! - [`extract::Extractor`] serves each record kind lazily, eagerly, or as rows
//! - [`filter::FilterGuard`] refuses data the session's fetch mode excluded

#![warn(
    clippy::all,
    clippy::cargo,
    clippy::nursery,
    clippy::pedantic,
    missing_docs
)]
#![cfg_attr(
    not(test),
    deny(
        clippy::dbg_macro,
        clippy::expect_used,
        clippy::panic,
        clippy::print_stderr,
        clippy::print_stdout,
        clippy::todo,
        clippy::unwrap_used
    )
)]

/// Record assembly: identifiers, reachability, timestamps.
pub mod builder;
/// Session configuration and source locations.
pub mod config;
/// Diffs between arbitrary commit pairs.
pub mod diff;
/// Lazy, eager and row access to each record kind.
pub mod extract;
/// Fetch-mode policy enforcement.
pub mod filter;
/// Subprocess plumbing around the git binary.
pub mod git;
/// Parsers for plumbing output.
pub mod parse;
/// Scoped working-copy acquisition.
pub mod repository;

pub use config::{CommitScope, MergeDiffs, SessionConfig, Source};
pub use diff::PairDiff;
pub use extract::{Extractor, Records, Rows};
pub use filter::FetchMode;
pub use gitrows_api::*;
pub use repository::Session;

/// Common result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the extraction engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source could not be reached (missing path, network or auth failure).
    #[error("source {source_location} is unreachable: {reason}")]
    SourceUnreachable {
        /// URL or path that was requested.
        source_location: String,
        /// Diagnostic describing the failure.
        reason: String,
    },
    /// The source exists but is not a git repository.
    #[error("path does not reference a git repository: {path}")]
    NotARepository {
        /// Location that failed to resolve to a repository.
        path: String,
    },
    /// A git subprocess exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", exit_label(.code))]
    ToolInvocation {
        /// Command line that was run.
        command: String,
        /// Exit code, or `None` when terminated by a signal.
        code: Option<i32>,
        /// Captured diagnostic output.
        stderr: String,
    },
    /// Plumbing output was malformed or truncated.
    #[error("malformed plumbing output at byte {offset} (last good record: {}): {reason}", last_good_label(.last_good))]
    Parse {
        /// Byte offset of the failing record within the command output.
        offset: u64,
        /// Ordinal of the last record parsed successfully, if any.
        last_good: Option<u64>,
        /// What was wrong with the record.
        reason: String,
    },
    /// The requested data is excluded by the session's fetch mode.
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// The installed git is too old for the plumbing flags in use.
    #[error("git {required} or newer is required, found {found}")]
    UnsupportedGit {
        /// Version reported by `git --version`.
        found: String,
        /// Minimum supported version.
        required: &'static str,
    },
    /// Underlying libgit2 operation failed.
    #[error("git error: {source}")]
    Git {
        /// Original libgit2 error.
        #[from]
        source: git2::Error,
    },
    /// The git binary could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Command line that was attempted.
        command: String,
        /// Source I/O error returned by the standard library.
        #[source]
        source: std::io::Error,
    },
    /// Filesystem interaction failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Filesystem path involved in the failed operation.
        path: String,
        /// Source I/O error returned by the standard library.
        #[source]
        source: std::io::Error,
    },
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |code| format!("status {code}"))
}

#[allow(clippy::ref_option)]
fn last_good_label(last_good: &Option<u64>) -> String {
    last_good.map_or_else(|| "none".to_string(), |ordinal| format!("#{ordinal}"))
}
