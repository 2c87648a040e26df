use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::{Error, Result};

/// Config overrides applied to every invocation so user or system settings
/// cannot change the output format being parsed.
const PINNED_CONFIG: &[&str] = &[
    "core.quotePath=false",
    "color.ui=never",
    "log.showSignature=false",
    "diff.noprefix=false",
    "diff.mnemonicPrefix=false",
];

/// Runs git subcommands against one working copy.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: OsString,
    workdir: PathBuf,
}

impl GitCli {
    /// Bind an invoker to a working copy.
    #[must_use]
    pub fn new(binary: impl Into<OsString>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            workdir: workdir.into(),
        }
    }

    /// Directory the commands run in.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Stream `git log` with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] when git cannot be started.
    pub fn log<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<GitStream> {
        self.stream("log", args)
    }

    /// Stream `git diff` between two revisions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] when git cannot be started.
    pub fn diff<S: AsRef<OsStr>>(&self, old: &str, new: &str, args: &[S]) -> Result<GitStream> {
        let mut full: Vec<OsString> = args.iter().map(|arg| arg.as_ref().to_owned()).collect();
        full.push(OsString::from(old));
        full.push(OsString::from(new));
        full.push(OsString::from("--"));
        self.stream("diff", &full)
    }

    /// Stream branch heads in `format`, a `for-each-ref` format string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] when git cannot be started.
    pub fn branches(&self, format: &str) -> Result<GitStream> {
        self.stream("for-each-ref", &[format, "refs/heads"])
    }

    /// Stream tags in `format`, a `for-each-ref` format string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] when git cannot be started.
    pub fn tags(&self, format: &str) -> Result<GitStream> {
        self.stream("for-each-ref", &[format, "refs/tags"])
    }

    fn stream<S: AsRef<OsStr>>(&self, subcommand: &str, args: &[S]) -> Result<GitStream> {
        let mut command = self.command();
        command.arg(subcommand).args(args);
        let label = describe(&self.binary, subcommand, args);

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(command = %label, workdir = %self.workdir.display(), "spawning git");
        let mut child = command.spawn().map_err(|source| Error::Spawn {
            command: label.clone(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::Spawn {
            command: label.clone(),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "stdout was not captured"),
        })?;
        let stderr = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || -> io::Result<Vec<u8>> {
                let mut buffer = Vec::new();
                stderr.read_to_end(&mut buffer)?;
                Ok(buffer)
            })
        });

        Ok(GitStream {
            command: label,
            child: Some(child),
            reader: BufReader::new(stdout),
            stderr,
            offset: 0,
        })
    }

    pub(crate) fn command(&self) -> Command {
        let mut command = base_command(&self.binary);
        command.current_dir(&self.workdir);
        command
    }
}

/// `git` with pinned config and a non-interactive, locale-neutral environment.
pub(crate) fn base_command(binary: &OsStr) -> Command {
    let mut command = Command::new(binary);
    for setting in PINNED_CONFIG {
        command.arg("-c").arg(setting);
    }
    command
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C")
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE");
    command
}

pub(crate) fn describe<S: AsRef<OsStr>>(binary: &OsStr, subcommand: &str, args: &[S]) -> String {
    let mut label = format!("{} {subcommand}", binary.to_string_lossy());
    for arg in args {
        label.push(' ');
        label.push_str(&arg.as_ref().to_string_lossy());
    }
    label
}

/// Incremental reader over one git subprocess's standard output.
///
/// The process is killed if the stream is dropped before it is finished.
pub struct GitStream {
    command: String,
    child: Option<Child>,
    reader: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<io::Result<Vec<u8>>>>,
    offset: u64,
}

impl GitStream {
    /// Command line this stream was produced by.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// OS process id while the process is still owned by the stream.
    #[must_use]
    pub fn process_id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Read up to and including `delimiter`, appending to `buf`.
    /// Returns the number of bytes read; zero means end of output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the pipe cannot be read.
    pub fn read_until(&mut self, delimiter: u8, buf: &mut Vec<u8>) -> Result<usize> {
        let read = self
            .reader
            .read_until(delimiter, buf)
            .map_err(|source| Error::Io {
                path: self.command.clone(),
                source,
            })?;
        self.offset += read as u64;
        Ok(read)
    }

    /// Read the remaining output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the pipe cannot be read.
    pub fn read_to_end(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let read = self
            .reader
            .read_to_end(buf)
            .map_err(|source| Error::Io {
                path: self.command.clone(),
                source,
            })?;
        self.offset += read as u64;
        Ok(read)
    }

    /// Reap the process after its output was fully consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolInvocation`] with the exit code and captured
    /// diagnostics when git exited unsuccessfully.
    pub fn finish(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait().map_err(|source| Error::Io {
            path: self.command.clone(),
            source,
        })?;
        let stderr = self.collect_stderr();
        check_status(&self.command, status, &stderr)?;
        debug!(command = %self.command, bytes = self.offset, "git finished");
        Ok(())
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .and_then(io::Result::ok)
            .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
            .unwrap_or_default()
    }
}

fn check_status(command: &str, status: ExitStatus, stderr: &str) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error::ToolInvocation {
            command: command.to_string(),
            code: status.code(),
            stderr: stderr.to_string(),
        })
    }
}

impl Drop for GitStream {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            debug!(command = %self.command, bytes = self.offset, "terminating git before end of output");
            let _ = child.kill();
            let _ = child.wait();
            let _ = self.collect_stderr();
        }
    }
}

impl fmt::Debug for GitStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitStream")
            .field("command", &self.command)
            .field("offset", &self.offset)
            .field("running", &self.child.is_some())
            .finish_non_exhaustive()
    }
}
