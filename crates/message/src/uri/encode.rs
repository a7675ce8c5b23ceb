use std::borrow::Cow;
use std::fmt::Write;

const fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'~')
}

const fn is_sub_delim(b: u8) -> bool {
    matches!(b, b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'=')
}

pub(crate) const fn is_path_byte(b: u8) -> bool {
    is_unreserved(b) || matches!(b, b':' | b'@' | b'&' | b'=' | b'+' | b'$' | b',' | b'/' | b';')
}

pub(crate) const fn is_query_byte(b: u8) -> bool {
    is_unreserved(b) || is_sub_delim(b) || matches!(b, b':' | b'@' | b'/' | b'?')
}

pub(crate) const fn is_user_info_byte(b: u8) -> bool {
    is_unreserved(b) || is_sub_delim(b)
}

/// Percent-encodes every byte not accepted by `allowed`.
///
/// A `%` is left alone when it already starts a valid `%XX` triplet, so
/// encoding is idempotent.
pub(crate) fn percent_encode(input: &str, allowed: fn(u8) -> bool) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    let is_kept = |i: usize| {
        let b = bytes[i];
        if b == b'%' {
            bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit) && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit)
        } else {
            allowed(b)
        }
    };

    if (0..bytes.len()).all(&is_kept) {
        return Cow::Borrowed(input);
    }

    let mut encoded = String::with_capacity(bytes.len() + bytes.len() / 2);
    for (i, &b) in bytes.iter().enumerate() {
        if is_kept(i) {
            encoded.push(char::from(b));
        } else {
            // writing into a String can't fail
            let _ = write!(encoded, "%{b:02X}");
        }
    }
    Cow::Owned(encoded)
}
