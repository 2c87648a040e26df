use tracing::trace;
use uuid::Uuid;

use super::command::GitStream;
use crate::Result;

/// Byte that opens every record in the formats the engine requests.
pub const RECORD_SEPARATOR: u8 = 0x1e;
/// Byte between fields of a record.
pub const UNIT_SEPARATOR: u8 = 0x1f;

/// One record's bytes, without the leading separator and marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Record payload.
    pub bytes: Vec<u8>,
    /// Offset of the payload within the command output.
    pub offset: u64,
}

/// Random token written after the record separator of one invocation.
///
/// Commit messages, tag annotations and file contents can contain the
/// separator byte followed by anything, including a commit hash. They cannot
/// contain a token drawn after the content was written, so a separator only
/// opens a record when the token follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMarker {
    token: String,
}

impl RecordMarker {
    /// Draw a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
        }
    }

    /// The token as it appears in the output.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// `git log` pretty format opening each record with the marker, then
    /// `fields`.
    #[must_use]
    pub fn log_format(&self, fields: &str) -> String {
        format!("--format=format:%x1e{}%x1f{fields}", self.token)
    }

    /// `git for-each-ref` format opening each record with the marker, then
    /// `fields`.
    #[must_use]
    pub fn ref_format(&self, fields: &str) -> String {
        format!("--format=%1e{}%1f{fields}", self.token)
    }

    /// Length of the marker prefix when `bytes` opens a record.
    fn prefix_len(&self, bytes: &[u8]) -> Option<usize> {
        bytes
            .strip_prefix(self.token.as_bytes())?
            .starts_with(&[UNIT_SEPARATOR])
            .then_some(self.token.len() + 1)
    }
}

impl Default for RecordMarker {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a [`GitStream`] into separator-delimited records.
///
/// A separator only ends a record when the invocation's [`RecordMarker`]
/// follows it. Any other separator byte is payload and stays in the record.
#[derive(Debug)]
pub struct RecordReader {
    stream: GitStream,
    marker: RecordMarker,
    lookahead: Option<RawRecord>,
    started: bool,
    exhausted: bool,
}

impl RecordReader {
    /// Read records from `stream`, whose format was built with `marker`.
    #[must_use]
    pub const fn new(stream: GitStream, marker: RecordMarker) -> Self {
        Self {
            stream,
            marker,
            lookahead: None,
            started: false,
            exhausted: false,
        }
    }

    /// Command line feeding this reader.
    #[must_use]
    pub fn command(&self) -> &str {
        self.stream.command()
    }

    /// Bytes consumed from the subprocess so far.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.stream.offset()
    }

    /// OS process id while git is still running.
    #[must_use]
    pub fn process_id(&self) -> Option<u32> {
        self.stream.process_id()
    }

    /// Next complete record, or `None` once git has exited successfully.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the pipe breaks, or
    /// [`crate::Error::ToolInvocation`] when git exits unsuccessfully. The
    /// exit status is checked before the final record is released, so a
    /// failing process never yields a truncated record.
    pub fn next_record(&mut self) -> Result<Option<RawRecord>> {
        if !self.started {
            self.started = true;
            self.lookahead = self.first_record()?;
        }

        let Some(mut current) = self.lookahead.take() else {
            return Ok(None);
        };
        while let Some(mut next) = self.read_chunk()? {
            if self.open_record(&mut next) {
                self.lookahead = Some(next);
                break;
            }
            current.bytes.push(RECORD_SEPARATOR);
            current.bytes.extend_from_slice(&next.bytes);
        }
        Ok(Some(current))
    }

    /// Skip whatever git printed before the first marked record.
    fn first_record(&mut self) -> Result<Option<RawRecord>> {
        let mut skipped = 0;
        while let Some(mut chunk) = self.read_chunk()? {
            if self.open_record(&mut chunk) {
                if skipped > 0 {
                    trace!(bytes = skipped, "discarded output before first record");
                }
                return Ok(Some(chunk));
            }
            skipped += chunk.bytes.len();
        }
        Ok(None)
    }

    /// Strip the marker from `chunk` when it opens a record.
    fn open_record(&self, chunk: &mut RawRecord) -> bool {
        let Some(len) = self.marker.prefix_len(&chunk.bytes) else {
            return false;
        };
        chunk.bytes.drain(..len);
        chunk.offset += len as u64;
        true
    }

    fn read_chunk(&mut self) -> Result<Option<RawRecord>> {
        if self.exhausted {
            return Ok(None);
        }
        let offset = self.stream.offset();
        let mut bytes = Vec::new();
        let read = self.stream.read_until(RECORD_SEPARATOR, &mut bytes)?;
        if read == 0 {
            self.exhausted = true;
            self.stream.finish()?;
            return Ok(None);
        }
        if bytes.last() == Some(&RECORD_SEPARATOR) {
            bytes.pop();
        }
        Ok(Some(RawRecord { bytes, offset }))
    }
}

/// Whether `bytes` is a full SHA-1 or SHA-256 object name in lowercase hex.
#[must_use]
pub fn is_object_hash(bytes: &[u8]) -> bool {
    matches!(bytes.len(), 40 | 64)
        && bytes
            .iter()
            .all(|&b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    #[test]
    fn recognizes_object_hashes() {
        assert!(is_object_hash(HASH.as_bytes()));
        assert!(is_object_hash(&[b'a'; 64]));
        assert!(!is_object_hash(&HASH.as_bytes()[..39]));
        assert!(!is_object_hash(HASH.to_uppercase().as_bytes()));
    }

    #[test]
    fn markers_are_unique_hex_tokens() {
        let first = RecordMarker::new();
        let second = RecordMarker::new();
        assert_ne!(first, second);
        assert_eq!(first.token().len(), 32);
        assert!(first.token().bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn formats_embed_the_marker() {
        let marker = RecordMarker::new();
        assert_eq!(
            marker.log_format("%H"),
            format!("--format=format:%x1e{}%x1f%H", marker.token())
        );
        assert_eq!(
            marker.ref_format("%(refname)"),
            format!("--format=%1e{}%1f%(refname)", marker.token())
        );
    }

    #[test]
    fn only_the_marker_opens_a_record() {
        let marker = RecordMarker::new();
        let marked = format!("{}\x1f{HASH}\n", marker.token());
        assert_eq!(marker.prefix_len(marked.as_bytes()), Some(33));

        let spoofed = format!("{HASH}\x1fparent");
        assert_eq!(marker.prefix_len(spoofed.as_bytes()), None);
        let unterminated = marker.token().to_string();
        assert_eq!(marker.prefix_len(unterminated.as_bytes()), None);
        let other = RecordMarker::new();
        let foreign = format!("{}\x1f{HASH}", other.token());
        assert_eq!(marker.prefix_len(foreign.as_bytes()), None);
    }
}
