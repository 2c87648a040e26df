//! Record model shared by the gitrows extraction engine and its consumers.
//!
//! Every entity here is immutable once built and implements [`Record`], the
//! field-order contract tabular adapters introspect instead of reflecting
//! over arbitrary values.

#![warn(missing_docs)]

/// Commits, signatures and per-commit statistics.
pub mod commit;
/// Line-level diffs and their hunks.
pub mod diff;
/// Filter errors raised when a fetch mode excludes a field.
pub mod error;
/// Per-file modifications and their stable identifiers.
pub mod file_mod;
/// The field-order contract shared by every record.
pub mod record;
/// Branches and tags.
pub mod refs;

pub use commit::*;
pub use diff::*;
pub use error::*;
pub use file_mod::*;
pub use record::*;
pub use refs::*;
