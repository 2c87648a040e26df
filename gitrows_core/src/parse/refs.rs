use gitrows_api::{Branch, Tag};

use super::{fields, utf8, Malformed, ParseResult};
use crate::git::is_object_hash;

/// `for-each-ref` fields of a branch record.
pub const BRANCH_FIELDS: &str = "%(refname:strip=2)%1f%(objectname)%1f%(HEAD)";

/// `for-each-ref` fields of a tag record.
pub const TAG_FIELDS: &str =
    "%(refname:strip=2)%1f%(objecttype)%1f%(objectname)%1f%(*objectname)%1f%(contents)";

/// Parse one `name␟tip␟HEAD` branch record.
///
/// # Errors
///
/// Returns [`Malformed`] when a field is missing or the tip is not a hash.
pub fn parse_branch(record: &[u8]) -> ParseResult<Branch> {
    let parts = fields(trim_line(record), 3);
    let [name, tip, head] = parts.as_slice() else {
        return Err(Malformed(format!(
            "branch record has {} fields, expected 3",
            parts.len()
        )));
    };
    Ok(Branch {
        name: String::from_utf8_lossy(name).into_owned(),
        tip: object(tip, "branch tip")?,
        is_default: *head == b"*",
    })
}

/// Parse one `name␟type␟object␟peeled␟contents` tag record.
///
/// Lightweight tags point straight at their target and carry no annotation;
/// the contents field git prints for them is the target's own message.
///
/// # Errors
///
/// Returns [`Malformed`] when a field is missing or an object name is invalid.
pub fn parse_tag(record: &[u8]) -> ParseResult<Tag> {
    let parts = fields(record, 5);
    let [name, kind, object_name, peeled, contents] = parts.as_slice() else {
        return Err(Malformed(format!(
            "tag record has {} fields, expected 5",
            parts.len()
        )));
    };
    let name = String::from_utf8_lossy(name).into_owned();
    let object_name = object(object_name, "tag object")?;

    if *kind == b"tag" {
        let target = if peeled.is_empty() {
            object_name.clone()
        } else {
            object(peeled, "tag target")?
        };
        let annotation = String::from_utf8_lossy(contents)
            .trim_end_matches('\n')
            .to_string();
        Ok(Tag {
            name,
            target,
            tag_object: Some(object_name),
            annotation: Some(annotation),
        })
    } else {
        Ok(Tag {
            name,
            target: object_name,
            tag_object: None,
            annotation: None,
        })
    }
}

fn object(bytes: &[u8], what: &str) -> ParseResult<String> {
    if !is_object_hash(bytes) {
        return Err(Malformed(format!(
            "{what} {:?} is not an object name",
            String::from_utf8_lossy(bytes)
        )));
    }
    Ok(utf8(bytes, what)?.to_string())
}

fn trim_line(bytes: &[u8]) -> &[u8] {
    bytes.strip_suffix(b"\n").unwrap_or(bytes)
}
