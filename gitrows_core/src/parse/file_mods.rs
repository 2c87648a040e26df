use super::{split_hash, utf8, Located, Malformed, ParseResult};

/// `git log` fields heading a file-modification record.
pub const FILE_MOD_FIELDS: &str = "%H";

/// One changed path in a commit, raw status and numstat combined.
///
/// Paths are the bytes git printed; they are not necessarily UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileModToken {
    /// Status letter (`A`, `M`, `D`, `R`, `C`, `T`, ...).
    pub status: char,
    /// Similarity score for renames and copies.
    pub similarity: Option<u8>,
    /// Path before the change.
    pub path_before: Vec<u8>,
    /// Path after the change.
    pub path_after: Vec<u8>,
    /// Lines added, `None` for binary content.
    pub added: Option<u32>,
    /// Lines deleted, `None` for binary content.
    pub deleted: Option<u32>,
}

impl FileModToken {
    /// Whether numstat reported the file as binary.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        self.added.is_none() && self.deleted.is_none()
    }
}

struct RawEntry {
    status: char,
    similarity: Option<u8>,
    path_before: Vec<u8>,
    path_after: Vec<u8>,
}

struct StatEntry {
    added: Option<u32>,
    deleted: Option<u32>,
    path_after: Vec<u8>,
}

/// Parse one `--raw --numstat -z` record headed by its commit hash.
///
/// # Errors
///
/// Returns [`Malformed`] when an entry is incomplete or raw and numstat
/// sections disagree.
pub fn parse_file_mod_record(record: &[u8]) -> ParseResult<(String, Vec<FileModToken>)> {
    let (hash, body) = split_hash(record)?;
    Ok((hash, parse_file_mod_body(body)?))
}

/// Parse the NUL-delimited raw and numstat entries of one diff.
///
/// # Errors
///
/// Returns [`Located`] pointing at the entry that is incomplete, or at the
/// numstat entry that disagrees with its raw entry.
pub fn parse_file_mod_body(body: &[u8]) -> Result<Vec<FileModToken>, Located> {
    let mut raw = Vec::new();
    let mut stats = Vec::new();
    let mut tokens = body
        .split(|&b| b == b'\0')
        .scan(0, |position: &mut usize, token| {
            let at = *position;
            *position += token.len() + 1;
            Some((at, token))
        });

    while let Some((at, head)) = tokens.next() {
        let trimmed = trim_leading_newlines(head);
        if trimmed.is_empty() {
            continue;
        }
        let offset = at + (head.len() - trimmed.len());
        let parsed = raw.len().min(stats.len());
        if trimmed[0] == b':' {
            let entry = raw_entry(trimmed, &mut tokens)
                .map_err(|reason| Located::new(offset, parsed, reason))?;
            raw.push(entry);
        } else {
            let entry = stat_entry(trimmed, &mut tokens)
                .map_err(|reason| Located::new(offset, parsed, reason))?;
            stats.push((offset, entry));
        }
    }

    if raw.len() != stats.len() {
        return Err(Located::new(
            body.len(),
            raw.len().min(stats.len()),
            Malformed(format!(
                "{} raw entries but {} numstat entries",
                raw.len(),
                stats.len()
            )),
        ));
    }

    raw.into_iter()
        .zip(stats)
        .enumerate()
        .map(|(index, (raw, (offset, stat)))| {
            if raw.path_after != stat.path_after {
                return Err(Located::new(
                    offset,
                    index,
                    Malformed(format!(
                        "numstat entry for {:?} does not match raw entry for {:?}",
                        String::from_utf8_lossy(&stat.path_after),
                        String::from_utf8_lossy(&raw.path_after)
                    )),
                ));
            }
            Ok(FileModToken {
                status: raw.status,
                similarity: raw.similarity,
                path_before: raw.path_before,
                path_after: raw.path_after,
                added: stat.added,
                deleted: stat.deleted,
            })
        })
        .collect()
}

fn trim_leading_newlines(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|&b| b != b'\n')
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn next_path<'a>(
    tokens: &mut impl Iterator<Item = (usize, &'a [u8])>,
    what: &str,
) -> ParseResult<Vec<u8>> {
    match tokens.next() {
        Some((_, path)) if !path.is_empty() => Ok(path.to_vec()),
        _ => Err(Malformed(format!("missing {what}"))),
    }
}

/// `:old_mode new_mode old_sha new_sha STATUS` followed by one or two paths.
fn raw_entry<'a>(
    head: &[u8],
    tokens: &mut impl Iterator<Item = (usize, &'a [u8])>,
) -> ParseResult<RawEntry> {
    let head = utf8(&head[1..], "raw entry")?;
    let status = head
        .split(' ')
        .nth(4)
        .ok_or_else(|| Malformed(format!("raw entry {head:?} has no status")))?;
    let mut chars = status.chars();
    let letter = chars
        .next()
        .ok_or_else(|| Malformed::new("empty raw status"))?;
    let score = chars.as_str();
    let similarity = if score.is_empty() {
        None
    } else {
        Some(
            score
                .parse::<u8>()
                .map_err(|err| Malformed(format!("invalid similarity {score:?}: {err}")))?,
        )
    };

    let first = next_path(tokens, "raw path")?;
    if matches!(letter, 'R' | 'C') {
        let second = next_path(tokens, "raw destination path")?;
        Ok(RawEntry {
            status: letter,
            similarity,
            path_before: first,
            path_after: second,
        })
    } else {
        Ok(RawEntry {
            status: letter,
            similarity: None,
            path_before: first.clone(),
            path_after: first,
        })
    }
}

/// `added\tdeleted\tpath`, or `added\tdeleted\t` followed by two paths.
fn stat_entry<'a>(
    head: &[u8],
    tokens: &mut impl Iterator<Item = (usize, &'a [u8])>,
) -> ParseResult<StatEntry> {
    let mut parts = head.splitn(3, |&b| b == b'\t');
    let (Some(added), Some(deleted), Some(path)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Malformed(format!(
            "numstat entry {:?} has fewer than three fields",
            String::from_utf8_lossy(head)
        )));
    };

    let path_after = if path.is_empty() {
        next_path(tokens, "numstat source path")?;
        next_path(tokens, "numstat destination path")?
    } else {
        path.to_vec()
    };

    Ok(StatEntry {
        added: count(added)?,
        deleted: count(deleted)?,
        path_after,
    })
}

fn count(field: &[u8]) -> ParseResult<Option<u32>> {
    if field == b"-" {
        return Ok(None);
    }
    let text = utf8(field, "numstat count")?;
    text.parse()
        .map(Some)
        .map_err(|err| Malformed(format!("invalid numstat count {text:?}: {err}")))
}
