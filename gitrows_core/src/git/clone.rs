use std::ffi::OsStr;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use git2::{Repository, RepositoryOpenFlags};
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use super::command::{base_command, describe};
use crate::config::Source;
use crate::{Error, Result};

const UNREACHABLE_MARKERS: &[&str] = &[
    "does not exist",
    "could not resolve host",
    "could not read from remote",
    "authentication failed",
    "repository not found",
    "unable to access",
    "connection refused",
    "connection timed out",
    "terminal prompts disabled",
];

/// Oldest git whose plumbing output the parsers understand.
pub const MINIMUM_GIT_VERSION: GitVersion = GitVersion {
    major: 2,
    minor: 31,
    patch: 0,
};

const MINIMUM_GIT_LABEL: &str = "2.31";

/// Version triple reported by `git --version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component, zero when absent.
    pub patch: u32,
}

impl GitVersion {
    /// Extract the version from `git --version` output.
    #[must_use]
    pub fn parse(output: &str) -> Option<Self> {
        static PATTERN: OnceCell<Regex> = OnceCell::new();
        let pattern = PATTERN
            .get_or_try_init(|| Regex::new(r"git version (\d+)\.(\d+)(?:\.(\d+))?"))
            .ok()?;
        let captures = pattern.captures(output)?;
        let component = |index: usize| {
            captures
                .get(index)
                .map_or(Some(0), |m| m.as_str().parse::<u32>().ok())
        };
        Some(Self {
            major: component(1)?,
            minor: component(2)?,
            patch: component(3)?,
        })
    }

    /// Ask `binary` for its version and reject anything older than
    /// [`MINIMUM_GIT_VERSION`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] when git cannot run, and
    /// [`Error::UnsupportedGit`] when it is too old or unrecognizable.
    pub fn detect(binary: &OsStr) -> Result<Self> {
        let label = describe(binary, "--version", &[] as &[&str]);
        let output = base_command(binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::Spawn {
                command: label.clone(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let found = stdout.trim().to_string();
        let version = Self::parse(&found).ok_or_else(|| Error::UnsupportedGit {
            found: found.clone(),
            required: MINIMUM_GIT_LABEL,
        })?;
        if version < MINIMUM_GIT_VERSION {
            return Err(Error::UnsupportedGit {
                found: version.to_string(),
                required: MINIMUM_GIT_LABEL,
            });
        }
        debug!(%version, "git version accepted");
        Ok(version)
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Create a bare clone of `source` at `dest`.
///
/// Without blobs the clone requests a `blob:none` filter; servers that do not
/// support filtering fall back to a full clone, and the session still refuses
/// blob-derived data.
///
/// # Errors
///
/// Returns [`Error::SourceUnreachable`] when the source cannot be read,
/// [`Error::NotARepository`] when a local path is not a repository and
/// [`Error::ToolInvocation`] for any other clone failure.
pub fn clone_bare(
    binary: &OsStr,
    source: &Source,
    dest: &Path,
    include_blobs: bool,
    timeout: Duration,
) -> Result<()> {
    let url = clone_url(source)?;

    let mut args: Vec<String> = vec!["--bare".into(), "--quiet".into(), "--no-hardlinks".into()];
    if !include_blobs {
        args.push("--filter=blob:none".into());
    }
    args.push(url);
    args.push(dest.to_string_lossy().into_owned());
    let label = describe(binary, "clone", &args);

    let mut command = base_command(binary);
    command
        .arg("clone")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    info!(source = %source, include_blobs, "cloning repository");
    let started = Instant::now();
    let mut child = command.spawn().map_err(|source| Error::Spawn {
        command: label.clone(),
        source,
    })?;

    let stderr_handle = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || -> io::Result<Vec<u8>> {
            let mut buffer = Vec::new();
            stderr.read_to_end(&mut buffer)?;
            Ok(buffer)
        })
    });

    match child.wait_timeout(timeout) {
        Ok(Some(_)) => (),
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            warn!(source = %source, ?timeout, "clone timed out");
            return Err(Error::SourceUnreachable {
                source_location: source.to_string(),
                reason: format!("clone did not finish within {}s", timeout.as_secs()),
            });
        }
        Err(err) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Io {
                path: label,
                source: err,
            });
        }
    }

    let status = child.wait().map_err(|source| Error::Io {
        path: label.clone(),
        source,
    })?;
    let stderr = join_reader(stderr_handle);

    if !status.success() {
        return Err(classify_clone_failure(source, label, status.code(), stderr));
    }

    info!(
        source = %source,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "clone finished"
    );
    Ok(())
}

fn join_reader(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .and_then(io::Result::ok)
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default()
}

fn clone_url(source: &Source) -> Result<String> {
    match source {
        Source::Remote(url) => Ok(url.clone()),
        Source::Local(path) => {
            let resolved = resolve_local(path)?;
            Ok(format!("file://{}", resolved.display()))
        }
    }
}

/// Resolve a local path to an absolute repository location, distinguishing a
/// missing path from one that is not a repository.
fn resolve_local(path: &Path) -> Result<PathBuf> {
    let resolved = path.canonicalize().map_err(|err| Error::SourceUnreachable {
        source_location: path.display().to_string(),
        reason: err.to_string(),
    })?;

    match Repository::open_ext(
        &resolved,
        RepositoryOpenFlags::NO_SEARCH,
        std::iter::empty::<&OsStr>(),
    ) {
        Ok(_) => Ok(resolved),
        Err(err) if err.code() == git2::ErrorCode::NotFound => Err(Error::NotARepository {
            path: path.display().to_string(),
        }),
        Err(err) => Err(err.into()),
    }
}

fn classify_clone_failure(
    source: &Source,
    command: String,
    code: Option<i32>,
    stderr: String,
) -> Error {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("does not appear to be a git repository")
        || lowered.contains("not a git repository")
    {
        return Error::NotARepository {
            path: source.to_string(),
        };
    }

    if UNREACHABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return Error::SourceUnreachable {
            source_location: source.to_string(),
            reason: stderr,
        };
    }

    Error::ToolInvocation {
        command,
        code,
        stderr,
    }
}
