//! The parts shared by every message kind: protocol version, headers and body.
//!
//! Messages are values. Every `with_*` method leaves the receiver untouched
//! and returns a new message; the header collection is reference counted so
//! derived messages share it until one of them changes a header.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use triomphe::Arc;

use crate::protocol::MessageError;
use crate::protocol::header_security::is_token;
use crate::stream::Body;

/// The HTTP protocol versions a message may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    Http10,
    #[default]
    Http11,
    Http20,
    /// `2` is accepted as a distinct spelling of HTTP/2 and kept as written.
    Http2,
}

impl ProtocolVersion {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::Http10 => "1.0",
            ProtocolVersion::Http11 => "1.1",
            ProtocolVersion::Http20 => "2.0",
            ProtocolVersion::Http2 => "2",
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.0" => Ok(ProtocolVersion::Http10),
            "1.1" => Ok(ProtocolVersion::Http11),
            "2.0" => Ok(ProtocolVersion::Http20),
            "2" => Ok(ProtocolVersion::Http2),
            _ => Err(MessageError::unsupported_protocol_version(s)),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One or more raw values for a single header, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderValues(Vec<String>);

impl HeaderValues {
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for HeaderValues {
    fn from(value: &str) -> Self {
        HeaderValues(vec![value.to_owned()])
    }
}

impl From<String> for HeaderValues {
    fn from(value: String) -> Self {
        HeaderValues(vec![value])
    }
}

impl From<&String> for HeaderValues {
    fn from(value: &String) -> Self {
        HeaderValues(vec![value.clone()])
    }
}

impl From<Vec<String>> for HeaderValues {
    fn from(values: Vec<String>) -> Self {
        HeaderValues(values)
    }
}

impl From<Vec<&str>> for HeaderValues {
    fn from(values: Vec<&str>) -> Self {
        HeaderValues(values.into_iter().map(str::to_owned).collect())
    }
}

impl From<&[&str]> for HeaderValues {
    fn from(values: &[&str]) -> Self {
        HeaderValues(values.iter().map(|&v| v.to_owned()).collect())
    }
}

impl From<&[String]> for HeaderValues {
    fn from(values: &[String]) -> Self {
        HeaderValues(values.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for HeaderValues {
    fn from(values: [&str; N]) -> Self {
        HeaderValues(values.iter().map(|&v| v.to_owned()).collect())
    }
}

macro_rules! header_values_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for HeaderValues {
                fn from(value: $ty) -> Self {
                    HeaderValues(vec![value.to_string()])
                }
            }
        )*
    };
}

header_values_from_number!(u16, u32, u64, usize, i32, i64);

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    name: String,
    values: Vec<String>,
}

/// Case-insensitive header collection that remembers the casing each
/// header was last set with, and the order headers were added in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Headers {
    entries: IndexMap<String, HeaderEntry>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Values of the header, or an empty slice when absent.
    pub fn get(&self, name: &str) -> &[String] {
        self.entries.get(&name.to_ascii_lowercase()).map(|entry| entry.values.as_slice()).unwrap_or_default()
    }

    /// Values joined with `,`, or an empty string when absent.
    pub fn get_line(&self, name: &str) -> String {
        self.get(name).join(",")
    }

    /// The casing the header is currently stored under.
    pub fn original_name(&self, name: &str) -> Option<&str> {
        self.entries.get(&name.to_ascii_lowercase()).map(|entry| entry.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.values().map(|entry| (entry.name.as_str(), entry.values.as_slice()))
    }

    /// Replaces any existing header, adopting the casing of `name`.
    pub(crate) fn replace(&mut self, name: &str, values: Vec<String>) {
        let key = name.to_ascii_lowercase();
        self.entries.shift_remove(&key);
        self.entries.insert(key, HeaderEntry { name: name.to_owned(), values });
    }

    /// Appends values, keeping the existing casing and position if present.
    pub(crate) fn append(&mut self, name: &str, values: Vec<String>) {
        let key = name.to_ascii_lowercase();
        match self.entries.get_mut(&key) {
            Some(entry) => entry.values.extend(values),
            None => {
                self.entries.insert(key, HeaderEntry { name: name.to_owned(), values });
            }
        }
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        self.entries.shift_remove(&name.to_ascii_lowercase()).is_some()
    }

    /// Sets the header as the first entry, keeping an existing casing or using `name`.
    pub(crate) fn replace_first(&mut self, name: &str, values: Vec<String>) {
        let key = name.to_ascii_lowercase();
        let name = self.entries.shift_remove(&key).map_or_else(|| name.to_owned(), |entry| entry.name);

        let mut entries = IndexMap::with_capacity(self.entries.len() + 1);
        entries.insert(key, HeaderEntry { name, values });
        entries.extend(self.entries.drain(..));
        self.entries = entries;
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a [String]);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a [String])> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Validates a header name and normalizes its values.
///
/// Values are trimmed of surrounding spaces and tabs, and must only contain
/// visible characters, space, tab or obs-text bytes.
pub(crate) fn normalize_header(name: &str, values: HeaderValues) -> Result<Vec<String>, MessageError> {
    if !is_token(name) {
        return Err(MessageError::invalid_header_name(name));
    }

    let values = values.into_inner();
    if values.is_empty() {
        return Err(MessageError::invalid_header_value(format!("values for header `{name}` can't be empty")));
    }

    values
        .into_iter()
        .map(|value| {
            if value.bytes().all(is_field_value_byte) {
                Ok(value.trim_matches([' ', '\t']).to_owned())
            } else {
                Err(MessageError::invalid_header_value(format!("{value:?} is not valid header value")))
            }
        })
        .collect()
}

const fn is_field_value_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | 0x21..=0x7e | 0x80..=0xff)
}

/// State common to requests, responses and server requests.
#[derive(Debug, Clone, Default)]
pub struct MessageParts {
    protocol: ProtocolVersion,
    headers: Arc<Headers>,
    body: OnceCell<Body>,
}

impl MessageParts {
    pub(crate) fn new(protocol: ProtocolVersion, headers: Headers, body: Option<Body>) -> Self {
        let body = body.map_or_else(OnceCell::new, OnceCell::with_value);
        Self { protocol, headers: Arc::new(headers), body }
    }

    pub(crate) fn headers_mut(&mut self) -> &mut Headers {
        Arc::make_mut(&mut self.headers)
    }

    pub(crate) fn shares_headers_with(&self, other: &MessageParts) -> bool {
        Arc::ptr_eq(&self.headers, &other.headers)
    }
}

/// Behaviour shared by every message kind.
///
/// Implementors only expose their [`MessageParts`]; all accessors and
/// derivations are provided.
pub trait HttpMessage: Clone {
    fn parts(&self) -> &MessageParts;

    fn parts_mut(&mut self) -> &mut MessageParts;

    fn protocol_version(&self) -> ProtocolVersion {
        self.parts().protocol
    }

    /// Returns a message with the given protocol version.
    ///
    /// Accepts `"1.0"`, `"1.1"`, `"2.0"` and `"2"`.
    fn with_protocol_version(&self, version: &str) -> Result<Self, MessageError> {
        let version = version.parse::<ProtocolVersion>()?;
        if version == self.protocol_version() {
            return Ok(self.clone());
        }

        let mut message = self.clone();
        message.parts_mut().protocol = version;
        Ok(message)
    }

    fn headers(&self) -> &Headers {
        &self.parts().headers
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers().contains(name)
    }

    fn header(&self, name: &str) -> &[String] {
        self.headers().get(name)
    }

    fn header_line(&self, name: &str) -> String {
        self.headers().get_line(name)
    }

    /// Returns a message where `name` holds exactly `values`.
    ///
    /// Any header matching `name` case-insensitively is replaced and the new
    /// casing is remembered.
    fn with_header(&self, name: &str, values: impl Into<HeaderValues>) -> Result<Self, MessageError> {
        let values = normalize_header(name, values.into())?;

        let mut message = self.clone();
        message.parts_mut().headers_mut().replace(name, values);
        Ok(message)
    }

    /// Returns a message with `values` appended to `name`.
    ///
    /// Behaves like [`HttpMessage::with_header`] when the header is absent.
    fn with_added_header(&self, name: &str, values: impl Into<HeaderValues>) -> Result<Self, MessageError> {
        if !self.has_header(name) {
            return self.with_header(name, values);
        }

        let values = normalize_header(name, values.into())?;

        let mut message = self.clone();
        message.parts_mut().headers_mut().append(name, values);
        Ok(message)
    }

    #[must_use]
    fn without_header(&self, name: &str) -> Self {
        if !self.has_header(name) {
            return self.clone();
        }

        let mut message = self.clone();
        message.parts_mut().headers_mut().remove(name);
        message
    }

    /// The message body, created as an empty temporary stream on first access.
    fn body(&self) -> &Body {
        self.parts().body.get_or_init(Body::default)
    }

    #[must_use]
    fn with_body(&self, body: Body) -> Self {
        if self.parts().body.get().is_some_and(|current| current.ptr_eq(&body)) {
            return self.clone();
        }

        let mut message = self.clone();
        message.parts_mut().body = OnceCell::with_value(body);
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct TestMessage {
        parts: MessageParts,
    }

    impl HttpMessage for TestMessage {
        fn parts(&self) -> &MessageParts {
            &self.parts
        }

        fn parts_mut(&mut self) -> &mut MessageParts {
            &mut self.parts
        }
    }

    #[test]
    fn protocol_version_defaults_to_1_1() {
        let message = TestMessage::default();
        assert_eq!(message.protocol_version(), ProtocolVersion::Http11);
        assert_eq!(message.protocol_version().as_str(), "1.1");
    }

    #[test]
    fn with_protocol_version() {
        let message = TestMessage::default();

        for version in ["1.0", "1.1", "2.0", "2"] {
            let derived = message.with_protocol_version(version).unwrap();
            assert_eq!(derived.protocol_version().as_str(), version);
        }
        assert_eq!(message.protocol_version(), ProtocolVersion::Http11);

        for version in ["1", "3", "HTTP/1.1", "", "1.2"] {
            assert!(matches!(
                message.with_protocol_version(version),
                Err(MessageError::UnsupportedProtocolVersion { .. })
            ));
        }
    }

    #[test]
    fn headers_are_case_insensitive() {
        let message = TestMessage::default().with_header("X-Foo", "bar").unwrap();

        assert!(message.has_header("x-foo"));
        assert!(message.has_header("X-FOO"));
        assert_eq!(message.header("x-FoO"), ["bar".to_owned()]);
        assert_eq!(message.header_line("missing"), "");
        assert!(message.header("missing").is_empty());
    }

    #[test]
    fn with_header_adopts_latest_casing() {
        let message = TestMessage::default()
            .with_header("X-Foo", "bar")
            .unwrap()
            .with_header("x-foo", ["baz", "qux"])
            .unwrap();

        let headers = message.headers().iter().collect::<Vec<_>>();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "x-foo");
        assert_eq!(message.header_line("X-FOO"), "baz,qux");
    }

    #[test]
    fn with_added_header_keeps_existing_casing() {
        let message = TestMessage::default()
            .with_header("X-Foo", "bar")
            .unwrap()
            .with_added_header("x-foo", "baz")
            .unwrap();

        assert_eq!(message.headers().original_name("x-foo"), Some("X-Foo"));
        assert_eq!(message.header("X-Foo"), ["bar".to_owned(), "baz".to_owned()]);

        let fresh = TestMessage::default().with_added_header("X-New", "1").unwrap();
        assert_eq!(fresh.header_line("x-new"), "1");
    }

    #[test]
    fn header_values_are_trimmed() {
        let message = TestMessage::default().with_header("X-Foo", " \tbar \t").unwrap();
        assert_eq!(message.header_line("x-foo"), "bar");

        let message = TestMessage::default().with_header("Content-Length", 42u64).unwrap();
        assert_eq!(message.header_line("content-length"), "42");
    }

    #[test]
    fn rejects_invalid_headers() {
        let message = TestMessage::default();

        assert!(matches!(message.with_header("bad name", "v"), Err(MessageError::InvalidHeaderName { .. })));
        assert!(matches!(message.with_header("", "v"), Err(MessageError::InvalidHeaderName { .. })));
        assert!(matches!(message.with_header("X-Foo", "a\r\nb"), Err(MessageError::InvalidHeaderValue { .. })));
        assert!(matches!(
            message.with_header("X-Foo", Vec::<String>::new()),
            Err(MessageError::InvalidHeaderValue { .. })
        ));
        assert!(matches!(
            message.with_added_header("X-Foo", "\u{7f}"),
            Err(MessageError::InvalidHeaderValue { .. })
        ));
        assert!(message.headers().is_empty());
    }

    #[test]
    fn without_header_is_idempotent() {
        let message = TestMessage::default().with_header("X-Foo", "bar").unwrap();

        let removed = message.without_header("x-foo");
        assert!(!removed.has_header("X-Foo"));
        assert!(message.has_header("X-Foo"));

        let untouched = removed.without_header("X-Foo");
        assert!(untouched.parts().shares_headers_with(removed.parts()));
    }

    #[test]
    fn derivations_share_unchanged_headers() {
        let message = TestMessage::default().with_header("X-Foo", "bar").unwrap();
        let derived = message.with_protocol_version("2.0").unwrap();

        assert!(derived.parts().shares_headers_with(message.parts()));
    }

    #[test]
    fn replace_first_moves_header_to_front() {
        let mut headers = Headers::new();
        headers.append("Accept", vec!["*/*".to_owned()]);
        headers.append("hOsT", vec!["old".to_owned()]);

        headers.replace_first("Host", vec!["example.com".to_owned()]);

        let names = headers.iter().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names, ["hOsT", "Accept"]);
        assert_eq!(headers.get_line("host"), "example.com");
    }

    #[test]
    fn body_is_created_lazily_and_stable() {
        let message = TestMessage::default();
        let first = message.body().clone();
        assert!(first.ptr_eq(message.body()));
        assert_eq!(first.to_string(), "");

        let body = Body::from("payload");
        let derived = message.with_body(body.clone());
        assert!(derived.body().ptr_eq(&body));
        assert!(message.body().ptr_eq(&first));

        let same = derived.with_body(body.clone());
        assert!(same.parts().shares_headers_with(derived.parts()));
        assert_eq!(same.body().to_string(), "payload");
    }
}
