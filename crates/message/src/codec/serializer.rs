//! HTTP/1 wire format of a [`Response`].
//!
//! The status line must read `HTTP/<major>.<minor> <status>[ <reason>]`, where
//! the major version has no leading zero, the minor version is one digit and
//! the status is in `100..=599`. Lines end with CRLF; a bare CR or LF inside
//! the head is malformed. Header values wrapped over several lines (each
//! continuation starting with a space or a tab) are joined with one space.
//! Everything after the blank line is the body.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::protocol::header_security::is_token;
use crate::protocol::{HttpMessage, Response, SerializeError};
use crate::stream::{Body, Stream};
use crate::utils::ensure;

/// Initial buffer size allocated for the response head
const INIT_HEAD_SIZE: usize = 1024;

/// Parses a response from a readable and seekable stream, reading it from the start.
pub fn parse(stream: &mut Stream) -> Result<Response, SerializeError> {
    ensure!(
        stream.is_readable() && stream.is_seekable(),
        SerializeError::invalid_argument("message stream must be both readable and seekable")
    );

    stream.rewind()?;
    let message = stream.contents()?;
    parse_bytes(&message)
}

/// Parses a response from its wire bytes.
pub fn parse_bytes(message: &[u8]) -> Result<Response, SerializeError> {
    let mut lines = Lines { rest: message };

    let status_line = String::from_utf8_lossy(lines.next_line()?.unwrap_or_default());
    let (version, status, reason) = parse_status_line(&status_line)?;
    trace!(version, status, reason, "parsed status line");

    let mut headers: Vec<(String, String)> = Vec::new();
    while let Some(line) = lines.next_line()? {
        if line.is_empty() {
            break;
        }

        let line = String::from_utf8_lossy(line);
        if line.starts_with([' ', '\t']) {
            let Some((_, value)) = headers.last_mut() else {
                return Err(SerializeError::malformed_header("continuation line before any header"));
            };
            value.push(' ');
            value.push_str(line.trim_start_matches([' ', '\t']));
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(SerializeError::malformed_header(format!("invalid header line `{line}`")));
        };
        ensure!(is_token(name), SerializeError::malformed_header(format!("invalid header name `{name}`")));
        headers.push((name.to_owned(), value.trim_start_matches([' ', '\t']).to_owned()));
    }
    trace!(header_count = headers.len(), body_size = lines.rest.len(), "parsed header block");

    let mut response = Response::default().with_status(status, reason)?.with_protocol_version(version)?;
    for (name, value) in headers {
        response = response.with_added_header(&name, value)?;
    }

    Ok(response.with_body(Body::new(Stream::from_bytes(lines.rest))))
}

/// Renders a response in wire format.
///
/// The head is followed by a blank line and the body only when the body is
/// not empty.
pub fn serialize(response: &Response) -> Bytes {
    let mut dst = BytesMut::new();
    encode_response(response, &mut dst);
    dst.freeze()
}

pub(crate) fn encode_response(response: &Response, dst: &mut BytesMut) {
    dst.reserve(INIT_HEAD_SIZE);

    dst.put_slice(b"HTTP/");
    dst.put_slice(response.protocol_version().as_str().as_bytes());
    dst.put_u8(b' ');
    dst.put_slice(response.status_code().to_string().as_bytes());
    if !response.reason_phrase().is_empty() {
        dst.put_u8(b' ');
        dst.put_slice(response.reason_phrase().as_bytes());
    }

    for (name, values) in response.headers() {
        for value in values {
            dst.put_slice(b"\r\n");
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
        }
    }

    let body = response.body().bytes();
    if !body.is_empty() {
        dst.reserve(body.len() + 4);
        dst.put_slice(b"\r\n\r\n");
        dst.put_slice(&body);
    }
}

/// CRLF terminated lines; the last line may end the input without one.
struct Lines<'a> {
    rest: &'a [u8],
}

impl<'a> Lines<'a> {
    fn next_line(&mut self) -> Result<Option<&'a [u8]>, SerializeError> {
        if self.rest.is_empty() {
            return Ok(None);
        }

        let Some(end) = self.rest.iter().position(|&b| b == b'\r' || b == b'\n') else {
            let line = self.rest;
            self.rest = &[];
            return Ok(Some(line));
        };

        ensure!(
            self.rest[end] == b'\r' && self.rest.get(end + 1) == Some(&b'\n'),
            SerializeError::malformed_header("line must end with CRLF")
        );
        let line = &self.rest[..end];
        self.rest = &self.rest[end + 2..];
        Ok(Some(line))
    }
}

fn parse_status_line(line: &str) -> Result<(&str, u16, &str), SerializeError> {
    let malformed = || SerializeError::malformed_status_line(line);

    let rest = line.strip_prefix("HTTP/").ok_or_else(malformed)?;
    let (version, rest) = rest.split_once(' ').ok_or_else(malformed)?;
    ensure!(is_version(version), malformed());

    let status = rest.get(..3).filter(|status| is_status(status)).ok_or_else(malformed)?;
    let status = status.parse::<u16>().map_err(|e| SerializeError::malformed_status_line(format!("{line}: {e}")))?;

    let after = &rest[3..];
    let reason = if after.is_empty() {
        ""
    } else {
        ensure!(after.starts_with(char::is_whitespace), malformed());
        let reason = after.trim_start();
        ensure!(!reason.is_empty(), malformed());
        reason
    };

    Ok((version, status, reason))
}

// `[1-9][0-9]*.[0-9]`
fn is_version(version: &str) -> bool {
    let Some((major, minor)) = version.split_once('.') else {
        return false;
    };

    !major.starts_with('0')
        && !major.is_empty()
        && major.bytes().all(|b| b.is_ascii_digit())
        && minor.len() == 1
        && minor.bytes().all(|b| b.is_ascii_digit())
}

// `[1-5][0-9][0-9]`
fn is_status(status: &str) -> bool {
    let bytes = status.as_bytes();
    matches!(bytes, [b'1'..=b'5', tens, ones] if tens.is_ascii_digit() && ones.is_ascii_digit())
}
