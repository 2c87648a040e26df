use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filter::FetchMode;

const DEFAULT_CLONE_TIMEOUT_SECS: u64 = 600;
const GIT_BIN_ENV: &str = "GITROWS_GIT_BIN";

/// Where a session clones history from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A URL (or scp-style address) handed to `git clone` as-is.
    Remote(String),
    /// A repository on the local filesystem.
    Local(PathBuf),
}

impl Source {
    /// Classify a user-supplied location.
    ///
    /// Anything with a URL scheme or an scp-style `user@host:path` prefix is
    /// remote; everything else is treated as a local path.
    #[must_use]
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        if is_url(trimmed) || is_scp_address(trimmed) {
            Self::Remote(trimmed.to_string())
        } else {
            Self::Local(PathBuf::from(trimmed))
        }
    }
}

fn is_url(location: &str) -> bool {
    location.split_once("://").is_some_and(|(scheme, rest)| {
        !scheme.is_empty()
            && !rest.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn is_scp_address(location: &str) -> bool {
    let Some((host, _)) = location.split_once(':') else {
        return false;
    };
    host.contains('@') && !host.contains('/')
}

impl From<&str> for Source {
    fn from(location: &str) -> Self {
        Self::parse(location)
    }
}

impl From<String> for Source {
    fn from(location: String) -> Self {
        Self::parse(&location)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Self::Local(path.to_path_buf())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Self::Local(path)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => f.write_str(url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// How merge commits contribute file modifications and diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDiffs {
    /// Merge commits contribute no file modifications.
    #[default]
    Off,
    /// Merge commits contribute their diff against the first parent.
    FirstParent,
}

impl MergeDiffs {
    pub(crate) const fn flag(self) -> &'static str {
        match self {
            Self::Off => "--diff-merges=off",
            Self::FirstParent => "--diff-merges=first-parent",
        }
    }
}

/// Which refs the history walk starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitScope {
    /// Every branch and tag.
    #[default]
    AllRefs,
    /// Only the default branch.
    DefaultBranch,
}

/// Per-session settings fixed at acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fetch file contents. Without blobs only metadata is available.
    pub include_blobs: bool,
    /// Merge-commit diff expansion policy.
    pub merge_diffs: MergeDiffs,
    /// Detect copies in addition to renames.
    pub detect_copies: bool,
    /// Context lines around each hunk.
    pub diff_context: u32,
    /// Starting refs for commit, file-mod and diff walks.
    pub commit_scope: CommitScope,
    /// Git executable to run.
    pub git_binary: PathBuf,
    /// Upper bound on the initial clone.
    pub clone_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let git_binary = env::var_os(GIT_BIN_ENV).unwrap_or_else(|| OsString::from("git"));
        Self {
            include_blobs: true,
            merge_diffs: MergeDiffs::Off,
            detect_copies: false,
            diff_context: 0,
            commit_scope: CommitScope::AllRefs,
            git_binary: PathBuf::from(git_binary),
            clone_timeout: Duration::from_secs(DEFAULT_CLONE_TIMEOUT_SECS),
        }
    }
}

impl SessionConfig {
    /// Defaults with blobs excluded.
    #[must_use]
    pub fn metadata_only() -> Self {
        Self::default().with_blobs(false)
    }

    /// Choose whether file contents are fetched.
    #[must_use]
    pub const fn with_blobs(mut self, include_blobs: bool) -> Self {
        self.include_blobs = include_blobs;
        self
    }

    /// Choose how merge commits contribute diffs.
    #[must_use]
    pub const fn with_merge_diffs(mut self, merge_diffs: MergeDiffs) -> Self {
        self.merge_diffs = merge_diffs;
        self
    }

    /// Enable or disable copy detection.
    #[must_use]
    pub const fn with_copy_detection(mut self, detect_copies: bool) -> Self {
        self.detect_copies = detect_copies;
        self
    }

    /// Number of context lines per hunk.
    #[must_use]
    pub const fn with_diff_context(mut self, lines: u32) -> Self {
        self.diff_context = lines;
        self
    }

    /// Restrict or widen the history walk.
    #[must_use]
    pub const fn with_commit_scope(mut self, scope: CommitScope) -> Self {
        self.commit_scope = scope;
        self
    }

    /// Use a specific git executable.
    #[must_use]
    pub fn with_git_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.git_binary = binary.into();
        self
    }

    /// Bound the time spent cloning.
    #[must_use]
    pub const fn with_clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = timeout;
        self
    }

    /// Fetch mode implied by `include_blobs`.
    #[must_use]
    pub const fn fetch_mode(&self) -> FetchMode {
        if self.include_blobs {
            FetchMode::WithBlobs
        } else {
            FetchMode::MetadataOnly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classifies_remote_locations() {
        assert_eq!(
            Source::parse("https://github.com/example/repo.git"),
            Source::Remote("https://github.com/example/repo.git".into())
        );
        assert_eq!(
            Source::parse("git@github.com:example/repo.git"),
            Source::Remote("git@github.com:example/repo.git".into())
        );
        assert_eq!(
            Source::parse(" file:///srv/repo "),
            Source::Remote("file:///srv/repo".into())
        );
    }

    #[test]
    fn parse_classifies_local_paths() {
        assert_eq!(
            Source::parse("/srv/repo"),
            Source::Local(PathBuf::from("/srv/repo"))
        );
        assert_eq!(
            Source::parse("relative/dir:with-colon"),
            Source::Local(PathBuf::from("relative/dir:with-colon"))
        );
        assert_eq!(Source::parse("C:/work"), Source::Local(PathBuf::from("C:/work")));
    }

    #[test]
    fn builder_setters_apply() {
        let config = SessionConfig::metadata_only()
            .with_merge_diffs(MergeDiffs::FirstParent)
            .with_copy_detection(true)
            .with_diff_context(3)
            .with_commit_scope(CommitScope::DefaultBranch);

        assert_eq!(config.fetch_mode(), FetchMode::MetadataOnly);
        assert_eq!(config.merge_diffs.flag(), "--diff-merges=first-parent");
        assert!(config.detect_copies);
        assert_eq!(config.diff_context, 3);
        assert_eq!(config.commit_scope, CommitScope::DefaultBranch);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"include_blobs": false}"#).expect("deserialize config");
        assert!(!config.include_blobs);
        assert_eq!(config.merge_diffs, MergeDiffs::Off);
        assert_eq!(
            config.clone_timeout,
            Duration::from_secs(DEFAULT_CLONE_TIMEOUT_SECS)
        );
    }
}
