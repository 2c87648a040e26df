use gitrows_api::{DiffHunk, DiffLine, DiffLineKind, DiffRange};
use once_cell::sync::OnceCell;
use regex::Regex;

use super::quote::{patch_path, strip_side, unquote_path};
use super::{pattern, split_hash, Located, Malformed, ParseResult};

/// `git log` fields heading a patch record.
pub const DIFF_FIELDS: &str = "%H";

const HUNK_HEADER: &str = r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@ ?(.*)$";

/// Patch for one file, paths resolved to the bytes git recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiffToken {
    /// Path before the change (the source for renames and copies).
    pub path_before: Vec<u8>,
    /// Path after the change.
    pub path_after: Vec<u8>,
    /// Git printed a binary marker, or a hunk line was not UTF-8.
    pub is_binary: bool,
    /// Text hunks in file order.
    pub hunks: Vec<DiffHunk>,
}

/// Parse one `-p` record headed by its commit hash.
///
/// # Errors
///
/// Returns [`Malformed`] when a hunk header is unreadable or a hunk ends
/// before the line counts in its header are satisfied.
pub fn parse_diff_record(record: &[u8]) -> ParseResult<(String, Vec<FileDiffToken>)> {
    let (hash, body) = split_hash(record)?;
    Ok((hash, parse_diff_body(body)?))
}

/// Parse a patch covering any number of files.
///
/// # Errors
///
/// Returns [`Located`] when a hunk header is unreadable or a hunk ends
/// before the line counts in its header are satisfied. Line defects point at
/// the offending line; unfinished files point at their `diff --git` line.
pub fn parse_diff_body(body: &[u8]) -> Result<Vec<FileDiffToken>, Located> {
    let mut files = Vec::new();
    let mut current: Option<(usize, FileSection)> = None;
    let mut offset = 0;

    for line in body.split(|&b| b == b'\n') {
        let at = offset;
        offset += line.len() + 1;
        let parsed = files.len();

        if let Some((_, section)) = current.as_mut() {
            if section.in_hunk() {
                section
                    .hunk_line(line)
                    .map_err(|reason| Located::new(at, parsed, reason))?;
                continue;
            }
        }

        if let Some(rest) = line.strip_prefix(b"diff --git ") {
            if let Some((start, done)) = current.take() {
                files.push(
                    done.finish()
                        .map_err(|reason| Located::new(start, parsed, reason))?,
                );
            }
            current = Some((at, FileSection::new(rest)));
            continue;
        }

        let Some((_, section)) = current.as_mut() else {
            continue;
        };
        if line.starts_with(b"@@ ") {
            section
                .start_hunk(&String::from_utf8_lossy(line))
                .map_err(|reason| Located::new(at, parsed, reason))?;
        } else if !section.seen_hunk {
            section.header_line(line);
        }
    }

    if let Some((start, done)) = current.take() {
        let parsed = files.len();
        files.push(
            done.finish()
                .map_err(|reason| Located::new(start, parsed, reason))?,
        );
    }
    Ok(files)
}

struct OpenHunk {
    hunk: DiffHunk,
    old_remaining: u32,
    new_remaining: u32,
    old_line: u32,
    new_line: u32,
}

#[derive(Default)]
struct FileSection {
    header_paths: Option<(Vec<u8>, Vec<u8>)>,
    rename_from: Option<Vec<u8>>,
    rename_to: Option<Vec<u8>>,
    minus: Option<Option<Vec<u8>>>,
    plus: Option<Option<Vec<u8>>>,
    is_binary: bool,
    seen_hunk: bool,
    hunks: Vec<DiffHunk>,
    open: Option<OpenHunk>,
}

impl FileSection {
    fn new(header: &[u8]) -> Self {
        Self {
            header_paths: split_header_paths(header),
            ..Self::default()
        }
    }

    fn in_hunk(&self) -> bool {
        self.open
            .as_ref()
            .is_some_and(|open| open.old_remaining > 0 || open.new_remaining > 0)
    }

    fn header_line(&mut self, line: &[u8]) {
        if let Some(path) = line
            .strip_prefix(b"rename from ")
            .or_else(|| line.strip_prefix(b"copy from "))
        {
            self.rename_from = Some(unquote_path(path));
        } else if let Some(path) = line
            .strip_prefix(b"rename to ")
            .or_else(|| line.strip_prefix(b"copy to "))
        {
            self.rename_to = Some(unquote_path(path));
        } else if let Some(path) = line.strip_prefix(b"--- ") {
            self.minus = Some(patch_path(path));
        } else if let Some(path) = line.strip_prefix(b"+++ ") {
            self.plus = Some(patch_path(path));
        } else if line.starts_with(b"Binary files ") && line.ends_with(b" differ") {
            self.is_binary = true;
        }
    }

    fn start_hunk(&mut self, line: &str) -> ParseResult<()> {
        static HEADER: OnceCell<Regex> = OnceCell::new();
        self.close_hunk();

        let captures = pattern(&HEADER, HUNK_HEADER)?
            .captures(line)
            .ok_or_else(|| Malformed(format!("unreadable hunk header {line:?}")))?;
        let number = |index: usize| -> ParseResult<u32> {
            captures.get(index).map_or(Ok(1), |m| {
                m.as_str()
                    .parse()
                    .map_err(|err| Malformed(format!("invalid hunk range in {line:?}: {err}")))
            })
        };
        let range = DiffRange {
            old_start: number(1)?,
            old_lines: number(2)?,
            new_start: number(3)?,
            new_lines: number(4)?,
        };
        let section = captures
            .get(5)
            .map(|m| m.as_str().to_string())
            .filter(|text| !text.is_empty());

        self.seen_hunk = true;
        self.open = Some(OpenHunk {
            hunk: DiffHunk {
                range,
                section,
                lines: Vec::new(),
            },
            old_remaining: range.old_lines,
            new_remaining: range.new_lines,
            old_line: range.old_start,
            new_line: range.new_start,
        });
        Ok(())
    }

    fn hunk_line(&mut self, line: &[u8]) -> ParseResult<()> {
        let Some(open) = self.open.as_mut() else {
            return Ok(());
        };
        let Some((&marker, content)) = line.split_first() else {
            return Err(Malformed(format!(
                "patch truncated: {} old and {} new lines missing",
                open.old_remaining, open.new_remaining
            )));
        };

        let kind = match marker {
            b' ' => DiffLineKind::Context,
            b'+' => DiffLineKind::Addition,
            b'-' => DiffLineKind::Deletion,
            b'\\' => return Ok(()),
            _ => {
                return Err(Malformed(format!(
                    "hunk ended early: {} old and {} new lines missing",
                    open.old_remaining, open.new_remaining
                )))
            }
        };

        let (old_line, new_line) = match kind {
            DiffLineKind::Context => (Some(open.old_line), Some(open.new_line)),
            DiffLineKind::Addition => (None, Some(open.new_line)),
            DiffLineKind::Deletion => (Some(open.old_line), None),
        };
        if old_line.is_some() {
            open.old_remaining = open
                .old_remaining
                .checked_sub(1)
                .ok_or_else(|| Malformed::new("hunk has more old lines than its header"))?;
            open.old_line += 1;
        }
        if new_line.is_some() {
            open.new_remaining = open
                .new_remaining
                .checked_sub(1)
                .ok_or_else(|| Malformed::new("hunk has more new lines than its header"))?;
            open.new_line += 1;
        }

        match std::str::from_utf8(content) {
            Ok(text) => open.hunk.lines.push(DiffLine {
                kind,
                text: text.to_string(),
                old_line,
                new_line,
            }),
            Err(_) => self.is_binary = true,
        }
        Ok(())
    }

    fn close_hunk(&mut self) {
        if let Some(open) = self.open.take() {
            self.hunks.push(open.hunk);
        }
    }

    fn finish(mut self) -> ParseResult<FileDiffToken> {
        if let Some(open) = &self.open {
            if open.old_remaining > 0 || open.new_remaining > 0 {
                return Err(Malformed(format!(
                    "patch truncated: {} old and {} new lines missing",
                    open.old_remaining, open.new_remaining
                )));
            }
        }
        self.close_hunk();

        let (header_before, header_after) = self.header_paths.unwrap_or_default();
        let path_after = self
            .rename_to
            .clone()
            .or_else(|| self.plus.clone().flatten())
            .or_else(|| self.minus.clone().flatten())
            .unwrap_or(header_after);
        let path_before = match self.rename_from {
            Some(source) => source,
            None if path_after.is_empty() => header_before,
            None => path_after.clone(),
        };

        let hunks = if self.is_binary { Vec::new() } else { self.hunks };
        Ok(FileDiffToken {
            path_before,
            path_after,
            is_binary: self.is_binary,
            hunks,
        })
    }
}

/// Recover both paths from `a/<old> b/<new>`, quoted or not. Unquoted paths
/// containing spaces are only unambiguous when old and new are equal.
fn split_header_paths(header: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let len = header
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |index| index + 1);
    let header = &header[..len];
    if header.starts_with(b"\"") {
        let close = quoted_end(header)?;
        let old = unquote_path(&header[..=close]);
        let rest = &header[close + 1..];
        let new = unquote_path(rest.strip_prefix(b" ").unwrap_or(rest));
        return Some((strip_side(&old).to_vec(), strip_side(&new).to_vec()));
    }
    if header.ends_with(b"\"") {
        let start = find(header, b" \"", true)?;
        let new = unquote_path(&header[start + 1..]);
        return Some((strip_side(&header[..start]).to_vec(), strip_side(&new).to_vec()));
    }
    if header.len() % 2 == 1 {
        let middle = header.len() / 2;
        let (old, new) = (&header[..middle], &header[middle + 1..]);
        if old.get(2..) == new.get(2..) {
            return Some((strip_side(old).to_vec(), strip_side(new).to_vec()));
        }
    }
    let split = find(header, b" b/", false)?;
    Some((
        strip_side(&header[..split]).to_vec(),
        strip_side(&header[split + 1..]).to_vec(),
    ))
}

/// Position of the first (or last) occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8], last: bool) -> Option<usize> {
    let mut positions = haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(index, _)| index);
    if last {
        positions.last()
    } else {
        positions.next()
    }
}

fn quoted_end(text: &[u8]) -> Option<usize> {
    let mut escaped = false;
    for (index, &byte) in text.iter().enumerate().skip(1) {
        match byte {
            _ if escaped => escaped = false,
            b'\\' => escaped = true,
            b'"' => return Some(index),
            _ => {}
        }
    }
    None
}
