//! Scoped acquisition of a transient working copy and the record extractors
//! that read from it.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gitrows_api::{Branch, Commit, Diff, FileMod, Tag};
use once_cell::sync::OnceCell;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::builder::{CommitBuilder, DiffBuilder, FileModBuilder, Reachability};
use crate::config::{CommitScope, SessionConfig, Source};
use crate::extract::{Extractor, Records};
use crate::filter::{FetchMode, FilterGuard};
use crate::git::{clone_bare, GitCli, GitVersion, RecordMarker, RecordReader};
use crate::parse::commits::{parse_commit, parse_graph_entry, COMMIT_FIELDS, GRAPH_FIELDS};
use crate::parse::diffs::{parse_diff_record, DIFF_FIELDS};
use crate::parse::file_mods::{parse_file_mod_record, FILE_MOD_FIELDS};
use crate::parse::refs::{parse_branch, parse_tag, BRANCH_FIELDS, TAG_FIELDS};
use crate::parse::GraphEntry;
use crate::{Error, Result};

const CLONE_DIR: &str = "repo.git";

/// A bare clone of one source, removed when the session ends.
///
/// All extractors borrow the session, so the working copy outlives every
/// sequence read from it. [`Session::release`] consumes the session; there is
/// no way to reuse it afterwards.
pub struct Session {
    source: Source,
    config: SessionConfig,
    guard: FilterGuard,
    git: GitCli,
    clone_path: PathBuf,
    workdir: Option<TempDir>,
    reachability: OnceCell<Arc<Reachability>>,
}

impl Session {
    /// Clone `source` into a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedGit`] for an old git,
    /// [`Error::SourceUnreachable`] when the source cannot be read,
    /// [`Error::NotARepository`] when it is not a repository, and
    /// [`Error::ToolInvocation`] for any other clone failure. Nothing is left
    /// on disk when acquisition fails.
    pub fn acquire(source: impl Into<Source>, config: SessionConfig) -> Result<Self> {
        let source = source.into();
        let binary = config.git_binary.as_os_str();
        let version = GitVersion::detect(binary)?;

        let workdir = tempfile::Builder::new()
            .prefix("gitrows-")
            .tempdir()
            .map_err(|source| Error::Io {
                path: display_path(&std::env::temp_dir()),
                source,
            })?;
        let clone_path = workdir.path().join(CLONE_DIR);

        clone_bare(
            binary,
            &source,
            &clone_path,
            config.include_blobs,
            config.clone_timeout,
        )?;

        info!(
            source = %source,
            mode = ?config.fetch_mode(),
            %version,
            path = %clone_path.display(),
            "session acquired"
        );

        Ok(Self {
            guard: FilterGuard::new(config.fetch_mode()),
            git: GitCli::new(binary, &clone_path),
            source,
            config,
            clone_path,
            workdir: Some(workdir),
            reachability: OnceCell::new(),
        })
    }

    /// Remove the working copy now, reporting any failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the directory cannot be removed.
    pub fn release(mut self) -> Result<()> {
        let Some(workdir) = self.workdir.take() else {
            return Ok(());
        };
        let path = display_path(workdir.path());
        workdir.close().map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        info!(source = %self.source, %path, "session released");
        Ok(())
    }

    /// Where the history came from.
    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// Location of the bare clone.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.clone_path
    }

    /// Fetch mode fixed at acquisition.
    #[must_use]
    pub const fn mode(&self) -> FetchMode {
        self.guard.mode()
    }

    /// Settings the session was acquired with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) const fn git(&self) -> &GitCli {
        &self.git
    }

    pub(crate) const fn guard(&self) -> &FilterGuard {
        &self.guard
    }

    /// Commits in `git log` order.
    #[must_use]
    pub fn commits(&self) -> Extractor<'_, Commit> {
        Extractor::new(move || self.open_commits())
    }

    /// Local branches, default branch flagged.
    #[must_use]
    pub fn branches(&self) -> Extractor<'_, Branch> {
        Extractor::new(move || {
            let marker = RecordMarker::new();
            let stream = self.git.branches(&marker.ref_format(BRANCH_FIELDS))?;
            let reader = RecordReader::new(stream, marker);
            Ok(Records::new(
                "branch",
                reader,
                Box::new(|bytes: &[u8], out: &mut VecDeque<Branch>| {
                    out.push_back(parse_branch(bytes)?);
                    Ok(())
                }),
            ))
        })
    }

    /// Lightweight and annotated tags.
    #[must_use]
    pub fn tags(&self) -> Extractor<'_, Tag> {
        Extractor::new(move || {
            let marker = RecordMarker::new();
            let stream = self.git.tags(&marker.ref_format(TAG_FIELDS))?;
            let reader = RecordReader::new(stream, marker);
            Ok(Records::new(
                "tag",
                reader,
                Box::new(|bytes: &[u8], out: &mut VecDeque<Tag>| {
                    out.push_back(parse_tag(bytes)?);
                    Ok(())
                }),
            ))
        })
    }

    /// Per-file changes of every commit, in git's diff order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filter`] in metadata-only sessions.
    pub fn file_mods(&self) -> Result<Extractor<'_, FileMod>> {
        self.guard.require_blobs("file_mods")?;
        Ok(Extractor::new(move || {
            let mut args = vec![
                "--raw".to_string(),
                "--numstat".to_string(),
                "-z".to_string(),
                "--no-abbrev".to_string(),
            ];
            args.extend(self.log_diff_options());
            let Some(scope) = self.scope_args()? else {
                return Ok(Records::empty("file_mod"));
            };
            args.extend(scope);

            let reader = self.log_reader(FILE_MOD_FIELDS, &args)?;
            Ok(Records::new(
                "file_mod",
                reader,
                Box::new(|bytes: &[u8], out: &mut VecDeque<FileMod>| {
                    let (hash, tokens) = parse_file_mod_record(bytes)?;
                    out.extend(
                        tokens
                            .into_iter()
                            .map(|token| FileModBuilder.build(&hash, token)),
                    );
                    Ok(())
                }),
            ))
        }))
    }

    /// Line-level diffs of every commit. Binary files yield a binary marker;
    /// changes without line data yield nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filter`] in metadata-only sessions.
    pub fn diffs(&self) -> Result<Extractor<'_, Diff>> {
        self.guard.require_blobs("diffs")?;
        Ok(Extractor::new(move || {
            let mut args = vec!["-p".to_string()];
            args.extend(self.patch_options());
            args.extend(self.log_diff_options());
            let Some(scope) = self.scope_args()? else {
                return Ok(Records::empty("diff"));
            };
            args.extend(scope);

            let reader = self.log_reader(DIFF_FIELDS, &args)?;
            Ok(Records::new(
                "diff",
                reader,
                Box::new(|bytes: &[u8], out: &mut VecDeque<Diff>| {
                    let (hash, tokens) = parse_diff_record(bytes)?;
                    out.extend(
                        tokens
                            .into_iter()
                            .filter_map(|token| DiffBuilder.build(&hash, token)),
                    );
                    Ok(())
                }),
            ))
        }))
    }

    /// The branch the clone's `HEAD` points at, if it has commits.
    ///
    /// # Errors
    ///
    /// Propagates failures from listing branches.
    pub fn default_branch(&self) -> Result<Option<Branch>> {
        for branch in self.branches().iter()? {
            let branch = branch?;
            if branch.is_default {
                return Ok(Some(branch));
            }
        }
        Ok(None)
    }

    fn open_commits(&self) -> Result<Records<'_, Commit>> {
        let builder = CommitBuilder::new(self.reachability()?, self.mode().has_blobs());

        let mut args = vec!["--encoding=UTF-8".to_string()];
        if self.mode().has_blobs() {
            args.push("--shortstat".to_string());
            args.extend(self.log_diff_options());
        }
        let Some(scope) = self.scope_args()? else {
            return Ok(Records::empty("commit"));
        };
        args.extend(scope);

        let reader = self.log_reader(COMMIT_FIELDS, &args)?;
        Ok(Records::new(
            "commit",
            reader,
            Box::new(move |bytes: &[u8], out: &mut VecDeque<Commit>| {
                out.push_back(builder.build(parse_commit(bytes)?)?);
                Ok(())
            }),
        ))
    }

    /// Branch ownership of every commit, computed on first use.
    fn reachability(&self) -> Result<Arc<Reachability>> {
        self.reachability
            .get_or_try_init(|| {
                let branches = self.branches().collect()?;
                let reader = self.log_reader(GRAPH_FIELDS, &["--all".to_string()])?;
                let graph: Records<'_, GraphEntry> = Records::new(
                    "graph",
                    reader,
                    Box::new(|bytes: &[u8], out: &mut VecDeque<GraphEntry>| {
                        out.push_back(parse_graph_entry(bytes)?);
                        Ok(())
                    }),
                );
                let graph = graph.collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(Reachability::compute(graph, &branches)))
            })
            .map(Arc::clone)
    }

    /// Start `git log` with records made of `fields`, each opened by a fresh
    /// marker.
    fn log_reader(&self, fields: &str, args: &[String]) -> Result<RecordReader> {
        let marker = RecordMarker::new();
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(marker.log_format(fields));
        full.extend_from_slice(args);
        Ok(RecordReader::new(self.git.log(&full)?, marker))
    }

    /// Rename and copy detection shared by every diff-producing command.
    pub(crate) fn diff_options(&self) -> Vec<String> {
        let mut args = vec!["-M".to_string()];
        if self.config.detect_copies {
            args.push("-C".to_string());
        }
        args
    }

    /// Rename and copy detection plus the merge policy, for history walks.
    fn log_diff_options(&self) -> Vec<String> {
        let mut args = self.diff_options();
        args.push(self.config.merge_diffs.flag().to_string());
        args
    }

    /// Patch text settings that keep output parseable regardless of user
    /// configuration.
    pub(crate) fn patch_options(&self) -> Vec<String> {
        vec![
            format!("-U{}", self.config.diff_context),
            "--no-ext-diff".to_string(),
            "--no-textconv".to_string(),
            "--no-color".to_string(),
            "--src-prefix=a/".to_string(),
            "--dst-prefix=b/".to_string(),
        ]
    }

    /// Revisions the walk starts from, or `None` when the scope names a
    /// default branch the repository does not have.
    fn scope_args(&self) -> Result<Option<Vec<String>>> {
        match self.config.commit_scope {
            CommitScope::AllRefs => Ok(Some(vec!["--all".to_string()])),
            CommitScope::DefaultBranch => Ok(self.default_branch()?.map(|branch| {
                debug!(branch = %branch.name, "walking default branch only");
                vec![format!("refs/heads/{}", branch.name)]
            })),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(workdir) = self.workdir.take() {
            let path = display_path(workdir.path());
            match workdir.close() {
                Ok(()) => debug!(%path, "session working copy removed"),
                Err(err) => warn!(%path, error = %err, "failed to remove session working copy"),
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("source", &self.source)
            .field("path", &self.clone_path)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

pub(crate) fn display_path(path: &Path) -> String {
    path.to_path_buf()
        .into_os_string()
        .to_string_lossy()
        .into_owned()
}
