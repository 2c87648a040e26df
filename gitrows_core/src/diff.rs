//! Changes between two arbitrary revisions of a session.

use git2::Repository;
use gitrows_api::{Diff, FileMod};
use tracing::debug;

use crate::builder::{DiffBuilder, FileModBuilder};
use crate::parse::diffs::parse_diff_body;
use crate::parse::file_mods::parse_file_mod_body;
use crate::parse::Located;
use crate::repository::Session;
use crate::{Error, Result};

/// File modifications and diffs that turn `old` into `new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairDiff {
    /// Resolved hash of the starting revision.
    pub old: String,
    /// Resolved hash of the ending revision; record ids are keyed on it.
    pub new: String,
    /// Changed paths in git's diff order.
    pub file_mods: Vec<FileMod>,
    /// Line-level diffs for paths with line data.
    pub diffs: Vec<Diff>,
}

impl PairDiff {
    /// Total lines added across all files.
    #[must_use]
    pub fn lines_added(&self) -> u64 {
        self.file_mods
            .iter()
            .map(|file_mod| u64::from(file_mod.lines_added))
            .sum()
    }

    /// Total lines deleted across all files.
    #[must_use]
    pub fn lines_deleted(&self) -> u64 {
        self.file_mods
            .iter()
            .map(|file_mod| u64::from(file_mod.lines_deleted))
            .sum()
    }
}

impl Session {
    /// Diff two revisions (any expression `git rev-parse` accepts).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filter`] in metadata-only sessions, [`Error::Git`]
    /// when a revision does not resolve to a commit, and
    /// [`Error::ToolInvocation`] or [`Error::Parse`] when git fails or its
    /// output is malformed.
    pub fn diff_between(&self, old: &str, new: &str) -> Result<PairDiff> {
        self.guard().require_blobs("diff_between")?;

        let repo = Repository::open_bare(self.path())?;
        let old = resolve_commit(&repo, old)?;
        let new = resolve_commit(&repo, new)?;
        debug!(%old, %new, "diffing commit pair");

        let mut stat_args = vec![
            "--raw".to_string(),
            "--numstat".to_string(),
            "-z".to_string(),
            "--no-abbrev".to_string(),
        ];
        stat_args.extend(self.diff_options());
        let stat_output = self.read_diff(&old, &new, &stat_args)?;
        let file_mods = parse_file_mod_body(&stat_output)
            .map_err(malformed)?
            .into_iter()
            .map(|token| FileModBuilder.build(&new, token))
            .collect();

        let mut patch_args = vec!["-p".to_string()];
        patch_args.extend(self.patch_options());
        patch_args.extend(self.diff_options());
        let patch_output = self.read_diff(&old, &new, &patch_args)?;
        let diffs = parse_diff_body(&patch_output)
            .map_err(malformed)?
            .into_iter()
            .filter_map(|token| DiffBuilder.build(&new, token))
            .collect();

        Ok(PairDiff {
            old,
            new,
            file_mods,
            diffs,
        })
    }

    fn read_diff(&self, old: &str, new: &str, args: &[String]) -> Result<Vec<u8>> {
        let mut stream = self.git().diff(old, new, args)?;
        let mut output = Vec::new();
        stream.read_to_end(&mut output)?;
        stream.finish()?;
        Ok(output)
    }
}

fn resolve_commit(repo: &Repository, revision: &str) -> Result<String> {
    let commit = repo.revparse_single(revision)?.peel_to_commit()?;
    Ok(commit.id().to_string())
}

fn malformed(located: Located) -> Error {
    Error::Parse {
        offset: u64::try_from(located.offset).unwrap_or(u64::MAX),
        last_good: located
            .parsed
            .checked_sub(1)
            .and_then(|ordinal| u64::try_from(ordinal).ok()),
        reason: located.reason.0,
    }
}
