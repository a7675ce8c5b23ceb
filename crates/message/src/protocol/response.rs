//! Responses and the standard reason phrase table.

use std::fmt;

use crate::protocol::header_security::is_valid;
use crate::protocol::message::{HeaderValues, HttpMessage, MessageParts};
use crate::protocol::{HttpError, MessageError};
use crate::stream::Body;
use crate::utils::ensure;

/// The IANA registered reason phrase of a status code.
pub const fn reason_phrase(code: u16) -> Option<&'static str> {
    let phrase = match code {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        103 => "Early Hints",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        207 => "Multi-Status",
        208 => "Already Reported",
        226 => "IM Used",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        306 => "Status Reserved",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a teapot",
        421 => "Misdirected Request",
        422 => "Unprocessable Entity",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",
        _ => return None,
    };
    Some(phrase)
}

#[derive(Clone)]
pub struct Response {
    parts: MessageParts,
    status: u16,
    reason: String,
}

impl Response {
    /// Creates a response with the standard reason phrase of `status`.
    pub fn new(status: u16) -> Result<Self, MessageError> {
        let reason = validate_status(status, "")?;
        Ok(Self { parts: MessageParts::default(), status, reason })
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::new()
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason
    }

    /// Returns a response with the given status.
    ///
    /// The `reason` is trimmed; an empty one falls back to the standard phrase
    /// of the code, or stays empty for unregistered codes. A reason holding
    /// line breaks or control bytes fails with `InvalidArgument`.
    pub fn with_status(&self, code: u16, reason: &str) -> Result<Self, MessageError> {
        let reason = validate_status(code, reason)?;
        if code == self.status && reason == self.reason {
            return Ok(self.clone());
        }

        let mut response = self.clone();
        response.status = code;
        response.reason = reason;
        Ok(response)
    }
}

fn validate_status(code: u16, reason: &str) -> Result<String, MessageError> {
    ensure!((100..=599).contains(&code), MessageError::InvalidStatusCode { code });

    let reason = reason.trim();
    if reason.is_empty() {
        return Ok(reason_phrase(code).unwrap_or_default().to_owned());
    }

    ensure!(
        !reason.contains(['\r', '\n']) && is_valid(reason),
        MessageError::invalid_argument(format!("{reason:?} is not a valid reason phrase"))
    );
    Ok(reason.to_owned())
}

impl Default for Response {
    fn default() -> Self {
        Self { parts: MessageParts::default(), status: 200, reason: "OK".to_owned() }
    }
}

impl HttpMessage for Response {
    fn parts(&self) -> &MessageParts {
        &self.parts
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.parts
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("protocol_version", &self.protocol_version())
            .field("headers", self.headers())
            .finish_non_exhaustive()
    }
}

/// Builds a [`Response`], keeping the first error encountered.
#[derive(Debug)]
pub struct ResponseBuilder {
    inner: Result<Response, HttpError>,
    status: u16,
    reason: String,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self { inner: Ok(Response::default()), status: 200, reason: String::new() }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Appends values to the header, see [`HttpMessage::with_added_header`].
    pub fn header(self, name: &str, values: impl Into<HeaderValues>) -> Self {
        self.and_then(|response| Ok(response.with_added_header(name, values)?))
    }

    pub fn protocol_version(self, version: &str) -> Self {
        self.and_then(|response| Ok(response.with_protocol_version(version)?))
    }

    pub fn body(self, body: impl Into<Body>) -> Self {
        self.and_then(|response| Ok(response.with_body(body.into())))
    }

    pub fn build(self) -> Result<Response, HttpError> {
        Ok(self.inner?.with_status(self.status, &self.reason)?)
    }

    fn and_then(self, f: impl FnOnce(Response) -> Result<Response, HttpError>) -> Self {
        Self { inner: self.inner.and_then(f), ..self }
    }
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
