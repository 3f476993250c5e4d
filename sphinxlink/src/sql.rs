//! Sql string operation.
//!
//! SphinxQL has no bound parameters. The only placeholder understood here is the full text
//! clause marker `MATCH(?)`, which [`rewrite`] replaces with an escaped string literal.
use std::borrow::Cow;

use crate::common::debug;

/// Full text clause placeholder.
pub const MATCH_MARKER: &[u8] = b"MATCH(?)";

/// Replace the first [`MATCH_MARKER`] in `sql` with `MATCH('<clause>')`.
///
/// Both are wire text. `clause` is untrusted and always escaped. When `sql` has no marker it
/// is returned as is and `clause` is ignored.
///
/// ```
/// # use sphinxlink::sql::rewrite;
/// let sql = rewrite(b"SELECT * FROM idx WHERE MATCH(?)", b"it's");
/// assert_eq!(&sql[..], br"SELECT * FROM idx WHERE MATCH('it\'s')");
/// ```
pub fn rewrite<'a>(sql: &'a [u8], clause: &[u8]) -> Cow<'a, [u8]> {
    let Some(at) = sql.windows(MATCH_MARKER.len()).position(|w| w == MATCH_MARKER) else {
        debug!("query has no MATCH(?) marker, match clause ignored");
        return Cow::Borrowed(sql);
    };

    let mut out = Vec::with_capacity(sql.len() + clause.len() * 2 + 2);
    out.extend_from_slice(&sql[..at]);
    out.extend_from_slice(b"MATCH('");
    escape_into(clause, &mut out);
    out.extend_from_slice(b"')");
    out.extend_from_slice(&sql[at + MATCH_MARKER.len()..]);
    Cow::Owned(out)
}

/// Escape `value` for use inside a quoted SphinxQL string literal.
///
/// The escaped set is the one of `mysql_real_escape_string` on a UTF-8 connection. Every
/// escaped byte is ASCII, so multibyte UTF-8 sequences pass through unchanged.
pub fn escape(value: &[u8]) -> Cow<'_, [u8]> {
    if !value.iter().copied().any(needs_escape) {
        return Cow::Borrowed(value);
    }
    let mut out = Vec::with_capacity(value.len() + 8);
    escape_into(value, &mut out);
    Cow::Owned(out)
}

fn needs_escape(b: u8) -> bool {
    matches!(b, b'\0' | b'\n' | b'\r' | b'\\' | b'\'' | b'"' | b'\x1a')
}

fn escape_into(value: &[u8], out: &mut Vec<u8>) {
    for &b in value {
        match b {
            b'\0' => out.extend_from_slice(b"\\0"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\'' => out.extend_from_slice(b"\\'"),
            b'"' => out.extend_from_slice(b"\\\""),
            b'\x1a' => out.extend_from_slice(b"\\Z"),
            b => out.push(b),
        }
    }
}
