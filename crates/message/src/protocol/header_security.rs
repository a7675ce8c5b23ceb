//! Header value sanitation and validation.
//!
//! Header values are the usual entry point for response splitting: a value
//! carrying a bare `CR` or `LF` would end the header block early. The helpers
//! here reject such values, and [`filter`] strips them from values that come
//! from untrusted sources such as process environment variables.
//!
//! A `CRLF` is only tolerated when it is immediately followed by a space or a
//! horizontal tab, which is the legacy folded-line form.

use crate::protocol::MessageError;

/// Strips every byte that can't legally appear in a header value.
///
/// Bare `CR` and `LF` are removed, as are control characters other than
/// horizontal tab and `DEL`. A `CRLF` followed by space or tab is kept.
#[must_use]
pub fn filter(value: &str) -> String {
    let chars = value.chars().collect::<Vec<_>>();
    let mut filtered = String::with_capacity(value.len());

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if c == '\r' {
            if chars.get(i + 1) == Some(&'\n') && matches!(chars.get(i + 2), Some(' ' | '\t')) {
                filtered.push_str("\r\n");
                i += 2;
                continue;
            }
            i += 1;
            continue;
        }

        if (c < ' ' && c != '\t') || c == '\u{7f}' {
            i += 1;
            continue;
        }

        filtered.push(c);
        i += 1;
    }

    filtered
}

/// Checks whether the value contains only legal header value bytes.
#[must_use]
pub fn is_valid(value: &str) -> bool {
    let bytes = value.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\n' if i == 0 || bytes[i - 1] != b'\r' => return false,
            b'\r' => {
                if bytes.get(i + 1) != Some(&b'\n') || !matches!(bytes.get(i + 2), Some(b' ' | b'\t')) {
                    return false;
                }
            }
            b'\t' | b'\n' => {}
            0..=31 | 127 | 255 => return false,
            _ => {}
        }
    }

    true
}

/// Fails with [`MessageError::InvalidHeaderValue`] if the value is not valid.
pub fn assert_valid(value: &str) -> Result<(), MessageError> {
    if is_valid(value) {
        Ok(())
    } else {
        Err(MessageError::invalid_header_value(format!("{value:?} is not valid header value")))
    }
}

/// Fails with [`MessageError::InvalidHeaderName`] unless the name is a non-empty token.
pub fn assert_valid_name(name: &str) -> Result<(), MessageError> {
    if is_token(name) { Ok(()) } else { Err(MessageError::invalid_header_name(name)) }
}

pub(crate) fn is_token(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_token_byte)
}

const fn is_token_byte(b: u8) -> bool {
    matches!(b,
        b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9'
        | b'\'' | b'`' | b'#' | b'$' | b'%' | b'&' | b'*' | b'+'
        | b'.' | b'^' | b'_' | b'|' | b'~' | b'!' | b'-'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_removes_bare_line_breaks() {
        assert_eq!(filter("foo\r\nbar"), "foobar");
        assert_eq!(filter("foo\rbar"), "foobar");
        assert_eq!(filter("foo\nbar"), "foobar");
        assert_eq!(filter("foo\r\n\r\nbar"), "foobar");
    }

    #[test]
    fn filter_keeps_folded_lines() {
        assert_eq!(filter("foo\r\n bar"), "foo\r\n bar");
        assert_eq!(filter("foo\r\n\tbar"), "foo\r\n\tbar");
    }

    #[test]
    fn filter_drops_control_characters() {
        assert_eq!(filter("a\u{0}b\u{7f}c\u{1b}d\te"), "abcd\te");
        assert_eq!(filter("caf\u{e9}"), "caf\u{e9}");
    }

    #[test]
    fn validates_line_breaks() {
        assert!(is_valid("plain value"));
        assert!(is_valid("folded\r\n value"));
        assert!(is_valid("tab\tinside"));

        assert!(!is_valid("bare\nlf"));
        assert!(!is_valid("bare\rcr"));
        assert!(!is_valid("crlf\r\nwithout fold"));
        assert!(!is_valid("trailing\r\n"));
        assert!(!is_valid("null\u{0}byte"));
        assert!(!is_valid("del\u{7f}"));
    }

    #[test]
    fn validates_names() {
        assert!(assert_valid_name("X-Foo_Bar.baz~1").is_ok());
        assert!(assert_valid_name("!#$%&'*+-.^_`|~").is_ok());

        assert!(matches!(assert_valid_name(""), Err(MessageError::InvalidHeaderName { .. })));
        assert!(matches!(assert_valid_name("with space"), Err(MessageError::InvalidHeaderName { .. })));
        assert!(matches!(assert_valid_name("colon:"), Err(MessageError::InvalidHeaderName { .. })));
        assert!(matches!(assert_valid_name("x\r\ny"), Err(MessageError::InvalidHeaderName { .. })));
    }

    #[test]
    fn assert_valid_reports_value() {
        assert!(assert_valid("ok").is_ok());
        assert!(matches!(assert_valid("no\nway"), Err(MessageError::InvalidHeaderValue { .. })));
    }
}
