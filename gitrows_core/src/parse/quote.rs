/// Undo git's C-style quoting of a path (`"tab\tname"`). Unquoted input is
/// returned unchanged apart from the trailing tab git appends to names that
/// contain spaces. Paths stay bytes: git paths need not be UTF-8.
pub(crate) fn unquote_path(raw: &[u8]) -> Vec<u8> {
    let Some(inner) = raw
        .strip_prefix(b"\"")
        .and_then(|rest| rest.strip_suffix(b"\""))
    else {
        return raw.strip_suffix(b"\t").unwrap_or(raw).to_vec();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.iter().copied().peekable();
    while let Some(byte) = chars.next() {
        if byte != b'\\' {
            bytes.push(byte);
            continue;
        }
        let Some(escape) = chars.next() else {
            bytes.push(b'\\');
            break;
        };
        let decoded = match escape {
            b'a' => 0x07,
            b'b' => 0x08,
            b't' => b'\t',
            b'n' => b'\n',
            b'v' => 0x0b,
            b'f' => 0x0c,
            b'r' => b'\r',
            b'0'..=b'7' => {
                let mut value = u32::from(escape - b'0');
                for _ in 0..2 {
                    match chars.peek() {
                        Some(&digit @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(digit - b'0');
                            chars.next();
                        }
                        _ => break,
                    }
                }
                u8::try_from(value).unwrap_or(u8::MAX)
            }
            other => other,
        };
        bytes.push(decoded);
    }
    bytes
}

/// Strip the `a/` or `b/` prefix from a patch path; `/dev/null` maps to `None`.
pub(crate) fn patch_path(raw: &[u8]) -> Option<Vec<u8>> {
    let path = unquote_path(raw.strip_suffix(b"\n").unwrap_or(raw));
    if path == b"/dev/null" {
        return None;
    }
    Some(strip_side(&path).to_vec())
}

/// Drop the `a/` or `b/` side prefix git puts on patch paths.
pub(crate) fn strip_side(path: &[u8]) -> &[u8] {
    path.strip_prefix(b"a/")
        .or_else(|| path.strip_prefix(b"b/"))
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_plain_paths_alone() {
        assert_eq!(unquote_path(b"src/lib.rs"), b"src/lib.rs");
        assert_eq!(unquote_path(b"b/a b.txt\t"), b"b/a b.txt");
        assert_eq!(unquote_path("ü.txt".as_bytes()), "ü.txt".as_bytes());
        assert_eq!(unquote_path(b"caf\xe9.txt"), b"caf\xe9.txt");
    }

    #[test]
    fn decodes_escapes() {
        assert_eq!(unquote_path(br#""b/tab\tname""#), b"b/tab\tname");
        assert_eq!(unquote_path(br#""quo\"te""#), b"quo\"te");
        assert_eq!(unquote_path(br#""back\\slash""#), b"back\\slash");
        assert_eq!(unquote_path(br#""\303\274.txt""#), "ü.txt".as_bytes());
        assert_eq!(unquote_path(br#""caf\351.txt""#), b"caf\xe9.txt");
    }

    #[test]
    fn strips_patch_prefixes() {
        assert_eq!(patch_path(b"a/src/main.rs").as_deref(), Some(&b"src/main.rs"[..]));
        assert_eq!(patch_path(br#""b/tab\tname""#).as_deref(), Some(&b"tab\tname"[..]));
        assert_eq!(patch_path(b"/dev/null"), None);
    }
}
