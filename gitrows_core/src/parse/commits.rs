use once_cell::sync::OnceCell;
use regex::Regex;

use super::{fields, pattern, utf8, Malformed, ParseResult};
use crate::git::{is_object_hash, UNIT_SEPARATOR};

/// `git log` fields of a commit record. The trailing separator fences the
/// free-form message off from the optional `--shortstat` summary.
pub const COMMIT_FIELDS: &str = "%H%x1f%P%x1f%an%x1f%ae%x1f%aI%x1f%cn%x1f%ce%x1f%cI%x1f%B%x1f";

/// `git log` fields of a parent graph record.
pub const GRAPH_FIELDS: &str = "%H%x1f%P";

const HEADER_FIELDS: usize = 8;

/// Identity and timestamp as printed by git.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureToken {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Strict ISO 8601 timestamp with offset.
    pub date: String,
}

/// Totals from a `--shortstat` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShortStat {
    /// Files touched.
    pub files_changed: u32,
    /// Lines inserted.
    pub insertions: u32,
    /// Lines deleted.
    pub deletions: u32,
}

/// One commit record before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitToken {
    /// Full commit hash.
    pub hash: String,
    /// Parent hashes in order.
    pub parents: Vec<String>,
    /// Author identity.
    pub author: SignatureToken,
    /// Committer identity.
    pub committer: SignatureToken,
    /// First paragraph of the message.
    pub subject: String,
    /// Remainder of the message.
    pub body: String,
    /// Change totals, when git printed any.
    pub shortstat: Option<ShortStat>,
}

/// One node of the commit graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEntry {
    /// Commit hash.
    pub hash: String,
    /// Parent hashes in order.
    pub parents: Vec<String>,
}

/// Parse one commit record (without its leading separator and marker).
///
/// # Errors
///
/// Returns [`Malformed`] when fields are missing, hashes are invalid, or the
/// message terminator is absent (a truncated record).
pub fn parse_commit(record: &[u8]) -> ParseResult<CommitToken> {
    let parts = fields(record, HEADER_FIELDS + 1);
    if parts.len() <= HEADER_FIELDS {
        return Err(Malformed(format!(
            "expected {} header fields, found {}",
            HEADER_FIELDS,
            parts.len()
        )));
    }

    let hash = parse_hash(parts[0])?;
    let parents = parse_parents(parts[1])?;
    let author = signature(parts[2], parts[3], parts[4])?;
    let committer = signature(parts[5], parts[6], parts[7])?;

    let tail = parts[HEADER_FIELDS];
    let split = tail
        .iter()
        .rposition(|&b| b == UNIT_SEPARATOR)
        .ok_or_else(|| Malformed::new("commit message is not terminated"))?;
    let message = String::from_utf8_lossy(&tail[..split]);
    let trailer = utf8(&tail[split + 1..], "shortstat")?;

    let (subject, body) = split_message(&message);
    Ok(CommitToken {
        hash,
        parents,
        author,
        committer,
        subject,
        body,
        shortstat: parse_shortstat(trailer)?,
    })
}

/// Parse one `hash␟parents` graph record.
///
/// # Errors
///
/// Returns [`Malformed`] when the hash or a parent is not an object name.
pub fn parse_graph_entry(record: &[u8]) -> ParseResult<GraphEntry> {
    let parts = fields(record, 2);
    let [hash, parents] = parts.as_slice() else {
        return Err(Malformed::new("graph record is missing its parent field"));
    };
    Ok(GraphEntry {
        hash: parse_hash(hash)?,
        parents: parse_parents(trim_newlines(parents))?,
    })
}

fn parse_hash(bytes: &[u8]) -> ParseResult<String> {
    if !is_object_hash(bytes) {
        return Err(Malformed(format!(
            "invalid object name {:?}",
            String::from_utf8_lossy(bytes)
        )));
    }
    Ok(utf8(bytes, "object name")?.to_string())
}

fn parse_parents(bytes: &[u8]) -> ParseResult<Vec<String>> {
    bytes
        .split(|&b| b == b' ')
        .filter(|part| !part.is_empty())
        .map(parse_hash)
        .collect()
}

fn signature(name: &[u8], email: &[u8], date: &[u8]) -> ParseResult<SignatureToken> {
    Ok(SignatureToken {
        name: String::from_utf8_lossy(name).into_owned(),
        email: String::from_utf8_lossy(email).into_owned(),
        date: utf8(date, "timestamp")?.to_string(),
    })
}

fn trim_newlines(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != b'\n')
        .map_or(0, |index| index + 1);
    &bytes[..end]
}

/// Subject is the first paragraph with its lines joined, as `%s` renders it.
fn split_message(message: &str) -> (String, String) {
    let message = message.trim_start_matches('\n');
    let (subject, body) = message
        .split_once("\n\n")
        .unwrap_or((message, ""));
    let subject = subject
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (subject, body.trim().to_string())
}

fn parse_shortstat(trailer: &str) -> ParseResult<Option<ShortStat>> {
    static FILES: OnceCell<Regex> = OnceCell::new();
    static INSERTIONS: OnceCell<Regex> = OnceCell::new();
    static DELETIONS: OnceCell<Regex> = OnceCell::new();

    let line = trailer.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let count = |cell: &'static OnceCell<Regex>, source: &str| -> ParseResult<u32> {
        pattern(cell, source)?
            .captures(line)
            .and_then(|captures| captures.get(1))
            .map_or(Ok(0), |m| {
                m.as_str()
                    .parse()
                    .map_err(|err| Malformed(format!("invalid shortstat count: {err}")))
            })
    };

    let stat = ShortStat {
        files_changed: count(&FILES, r"(\d+) files? changed")?,
        insertions: count(&INSERTIONS, r"(\d+) insertions?\(\+\)")?,
        deletions: count(&DELETIONS, r"(\d+) deletions?\(-\)")?,
    };
    if stat.files_changed == 0 {
        return Err(Malformed(format!("unrecognized shortstat {line:?}")));
    }
    Ok(Some(stat))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "776a58220358b93b2acac0ac9b5d9ee24bd9a138";
    const PARENT: &str = "31d877b7e4dcb5c9a97a824ad211772ab66853f8";

    fn record(parents: &str, message: &str, trailer: &str) -> Vec<u8> {
        format!(
            "{HASH}\x1f{parents}\x1fAda\x1fada@example.com\x1f2026-10-18T14:41:15+02:00\x1fBob\x1fbob@example.com\x1f2026-10-18T14:41:15+00:00\x1f{message}\x1f{trailer}"
        )
        .into_bytes()
    }

    #[test]
    fn parses_full_commit_record() {
        let token = parse_commit(&record(
            PARENT,
            "two\n\nbody line\n",
            "\n 1 file changed, 1 insertion(+)\n\n",
        ))
        .expect("parse commit");

        assert_eq!(token.hash, HASH);
        assert_eq!(token.parents, vec![PARENT.to_string()]);
        assert_eq!(token.author.name, "Ada");
        assert_eq!(token.author.date, "2026-10-18T14:41:15+02:00");
        assert_eq!(token.committer.email, "bob@example.com");
        assert_eq!(token.subject, "two");
        assert_eq!(token.body, "body line");
        assert_eq!(
            token.shortstat,
            Some(ShortStat {
                files_changed: 1,
                insertions: 1,
                deletions: 0
            })
        );
    }

    #[test]
    fn root_commit_without_stats() {
        let token = parse_commit(&record("", "one\n", "\n")).expect("parse commit");
        assert!(token.parents.is_empty());
        assert_eq!(token.subject, "one");
        assert_eq!(token.body, "");
        assert_eq!(token.shortstat, None);
    }

    #[test]
    fn message_may_contain_unit_separators() {
        let token = parse_commit(&record(PARENT, "odd\x1fsubject\n\nx\x1fy\n", ""))
            .expect("parse commit");
        assert_eq!(token.subject, "odd\x1fsubject");
        assert_eq!(token.body, "x\x1fy");
    }

    #[test]
    fn multi_line_subject_is_joined() {
        let token =
            parse_commit(&record(PARENT, "first\nsecond\n\nbody\n", "")).expect("parse commit");
        assert_eq!(token.subject, "first second");
    }

    #[test]
    fn merge_commit_lists_both_parents() {
        let parents = format!("{PARENT} {HASH}");
        let token = parse_commit(&record(&parents, "Merge\n", "")).expect("parse commit");
        assert_eq!(token.parents.len(), 2);
    }

    #[test]
    fn deletions_and_plural_forms() {
        let stat = parse_shortstat(" 3 files changed, 10 insertions(+), 2 deletions(-)")
            .expect("parse")
            .expect("stat");
        assert_eq!(
            stat,
            ShortStat {
                files_changed: 3,
                insertions: 10,
                deletions: 2
            }
        );
        let stat = parse_shortstat(" 1 file changed, 1 deletion(-)")
            .expect("parse")
            .expect("stat");
        assert_eq!(stat.insertions, 0);
        assert_eq!(stat.deletions, 1);
    }

    #[test]
    fn truncated_records_are_malformed() {
        let full = record(PARENT, "subject\n", "");
        let cut = &full[..full.len() - 5];
        assert!(parse_commit(cut).is_err());
        assert!(parse_commit(format!("{HASH}\x1f{PARENT}").as_bytes()).is_err());
        assert!(parse_commit(b"garbage").is_err());
    }

    #[test]
    fn parses_graph_entries() {
        let entry = parse_graph_entry(format!("{HASH}\x1f{PARENT}\n").as_bytes()).expect("parse");
        assert_eq!(entry.hash, HASH);
        assert_eq!(entry.parents, vec![PARENT.to_string()]);

        let root = parse_graph_entry(format!("{PARENT}\x1f").as_bytes()).expect("parse");
        assert!(root.parents.is_empty());
    }
}
