//! Outgoing requests and the request-line behaviour shared with server requests.

use std::fmt;

use http::Method;
use triomphe::Arc;

use crate::protocol::message::{HeaderValues, HttpMessage, MessageParts};
use crate::protocol::{HttpError, MessageError};
use crate::stream::Body;
use crate::uri::Uri;
use crate::utils::ensure;

/// Method, target uri and request-target override of a request.
#[derive(Debug, Clone)]
pub struct RequestLine {
    method: Method,
    uri: Arc<Uri>,
    target: Option<String>,
}

impl Default for RequestLine {
    fn default() -> Self {
        Self { method: Method::GET, uri: Arc::new(Uri::new()), target: None }
    }
}

impl RequestLine {
    pub(crate) fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri: Arc::new(uri), target: None }
    }
}

/// Behaviour shared by [`Request`] and [`crate::ServerRequest`].
pub trait RequestMessage: HttpMessage {
    fn request_line(&self) -> &RequestLine;

    fn request_line_mut(&mut self) -> &mut RequestLine;

    fn method(&self) -> &Method {
        &self.request_line().method
    }

    /// Returns a request with the given method; methods are case-sensitive.
    fn with_method(&self, method: &str) -> Result<Self, MessageError> {
        let Ok(method) = Method::from_bytes(method.as_bytes()) else {
            return Err(MessageError::invalid_method(method));
        };
        if &method == self.method() {
            return Ok(self.clone());
        }

        let mut request = self.clone();
        request.request_line_mut().method = method;
        Ok(request)
    }

    fn uri(&self) -> &Uri {
        &self.request_line().uri
    }

    /// Returns a request targeting `uri`.
    ///
    /// The `Host` header is recomputed from the new uri and moved to the
    /// front, unless `preserve_host` is set and a non-empty `Host` header
    /// already exists. A uri without host leaves the header alone.
    #[must_use]
    fn with_uri(&self, uri: Uri, preserve_host: bool) -> Self {
        let mut request = self.clone();
        request.request_line_mut().uri = Arc::new(uri);

        if preserve_host && !self.header_line("Host").is_empty() {
            return request;
        }

        let uri = Arc::clone(&request.request_line().uri);
        update_host_header(request.parts_mut(), &uri);
        request
    }

    /// The explicit request target if one was set, otherwise `path[?query]` of the uri, or `/`.
    fn request_target(&self) -> String {
        if let Some(target) = &self.request_line().target {
            return target.clone();
        }

        let uri = self.uri();
        let mut target = uri.path().to_owned();
        if target.is_empty() {
            return "/".to_owned();
        }
        if !uri.query().is_empty() {
            target.push('?');
            target.push_str(uri.query());
        }
        target
    }

    fn with_request_target(&self, target: &str) -> Result<Self, MessageError> {
        ensure!(
            !target.chars().any(char::is_whitespace),
            MessageError::InvalidRequestTarget { target: target.to_owned() }
        );

        let mut request = self.clone();
        request.request_line_mut().target = Some(target.to_owned());
        Ok(request)
    }
}

/// Sets `Host` from the uri as the first header, keeping an existing casing.
pub(crate) fn update_host_header(parts: &mut MessageParts, uri: &Uri) {
    let host = uri.host();
    if host.is_empty() {
        return;
    }

    let host = match uri.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    parts.headers_mut().replace_first("Host", vec![host]);
}

/// An outgoing, client-side request.
///
/// # Example
///
/// ```
/// use micro_message::{HttpMessage, Request, RequestMessage};
///
/// let request = Request::builder()
///     .method("POST")
///     .uri("http://example.com:8080/submit?draft=1")
///     .header("Content-Type", "text/plain")
///     .body("hello")
///     .build()
///     .unwrap();
///
/// assert_eq!(request.header_line("host"), "example.com:8080");
/// assert_eq!(request.request_target(), "/submit?draft=1");
/// ```
#[derive(Clone, Default)]
pub struct Request {
    parts: MessageParts,
    line: RequestLine,
}

impl Request {
    /// Creates a request, adding a `Host` header derived from `uri`.
    pub fn new(method: Method, uri: Uri) -> Self {
        let mut request = Self { parts: MessageParts::default(), line: RequestLine::new(method, uri) };
        let uri = Arc::clone(&request.line.uri);
        update_host_header(&mut request.parts, &uri);
        request
    }

    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    pub(crate) fn from_parts(parts: MessageParts, line: RequestLine) -> Self {
        Self { parts, line }
    }
}

impl HttpMessage for Request {
    fn parts(&self) -> &MessageParts {
        &self.parts
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.parts
    }
}

impl RequestMessage for Request {
    fn request_line(&self) -> &RequestLine {
        &self.line
    }

    fn request_line_mut(&mut self) -> &mut RequestLine {
        &mut self.line
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("protocol_version", &self.protocol_version())
            .field("headers", self.headers())
            .finish_non_exhaustive()
    }
}

/// Builds a [`Request`], keeping the first error encountered.
///
/// The `Host` header is derived from the uri at [`RequestBuilder::build`]
/// unless one was set explicitly.
#[derive(Debug)]
pub struct RequestBuilder {
    inner: Result<Request, HttpError>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self { inner: Ok(Request::default()) }
    }

    pub fn method(self, method: impl AsRef<str>) -> Self {
        self.and_then(|request| Ok(request.with_method(method.as_ref())?))
    }

    pub fn uri<U>(self, uri: U) -> Self
    where
        U: TryInto<Uri>,
        U::Error: Into<HttpError>,
    {
        self.and_then(move |mut request| {
            request.line.uri = Arc::new(uri.try_into().map_err(Into::into)?);
            Ok(request)
        })
    }

    /// Appends values to the header, see [`HttpMessage::with_added_header`].
    pub fn header(self, name: &str, values: impl Into<HeaderValues>) -> Self {
        self.and_then(|request| Ok(request.with_added_header(name, values)?))
    }

    pub fn request_target(self, target: &str) -> Self {
        self.and_then(|request| Ok(request.with_request_target(target)?))
    }

    pub fn protocol_version(self, version: &str) -> Self {
        self.and_then(|request| Ok(request.with_protocol_version(version)?))
    }

    pub fn body(self, body: impl Into<Body>) -> Self {
        self.and_then(|request| Ok(request.with_body(body.into())))
    }

    pub fn build(self) -> Result<Request, HttpError> {
        let mut request = self.inner?;
        if !request.has_header("Host") {
            let uri = Arc::clone(&request.line.uri);
            update_host_header(&mut request.parts, &uri);
        }
        Ok(request)
    }

    fn and_then(self, f: impl FnOnce(Request) -> Result<Request, HttpError>) -> Self {
        Self { inner: self.inner.and_then(f) }
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::UriError;

    fn uri(s: &str) -> Uri {
        Uri::parse(s).unwrap()
    }

    #[test]
    fn request_target_defaults() {
        let request = Request::new(Method::GET, uri("http://h/a/b?c=1"));
        assert_eq!(request.request_target(), "/a/b?c=1");

        let request = Request::new(Method::GET, uri("http://h"));
        assert_eq!(request.request_target(), "/");

        let request = Request::new(Method::GET, uri("http://h?c=1"));
        assert_eq!(request.request_target(), "/");

        let request = Request::default();
        assert_eq!(request.request_target(), "/");
    }

    #[test]
    fn explicit_request_target() {
        let request = Request::new(Method::OPTIONS, uri("http://h/a"));
        let starred = request.with_request_target("*").unwrap();
        assert_eq!(starred.request_target(), "*");
        assert_eq!(request.request_target(), "/a");

        assert!(matches!(
            request.with_request_target("/with space"),
            Err(MessageError::InvalidRequestTarget { .. })
        ));
        assert!(matches!(request.with_request_target("/tab\t"), Err(MessageError::InvalidRequestTarget { .. })));
    }

    #[test]
    fn constructor_adds_host() {
        let request = Request::new(Method::GET, uri("http://example.com:8080/x"));
        assert_eq!(request.header_line("Host"), "example.com:8080");

        let request = Request::new(Method::GET, uri("https://example.com:443/x"));
        assert_eq!(request.header_line("host"), "example.com");

        let request = Request::new(Method::GET, uri("/relative"));
        assert!(!request.has_header("Host"));
    }

    #[test]
    fn with_uri_updates_host() {
        let request = Request::new(Method::GET, uri("http://old.example.com/"))
            .with_header("Accept", "*/*")
            .unwrap();

        let updated = request.with_uri(uri("http://example.com:8080/x"), false);
        assert_eq!(updated.header_line("Host"), "example.com:8080");
        assert_eq!(updated.uri().to_string(), "http://example.com:8080/x");
        assert_eq!(request.header_line("Host"), "old.example.com");

        let names = updated.headers().iter().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names, ["Host", "Accept"]);
    }

    #[test]
    fn with_uri_moves_host_first_and_keeps_casing() {
        let request = Request::default()
            .with_header("Accept", "*/*")
            .unwrap()
            .with_header("host", "old")
            .unwrap();

        let updated = request.with_uri(uri("http://new.example.com"), false);
        let headers = updated.headers().iter().collect::<Vec<_>>();
        assert_eq!(headers[0].0, "host");
        assert_eq!(headers[0].1, ["new.example.com".to_owned()]);
    }

    #[test]
    fn with_uri_preserves_host() {
        let request = Request::new(Method::GET, uri("http://original.example.com/"));

        let preserved = request.with_uri(uri("http://other.example.com/"), true);
        assert_eq!(preserved.header_line("Host"), "original.example.com");
        assert_eq!(preserved.uri().host(), "other.example.com");

        let without_host = Request::default().with_uri(uri("http://other.example.com/"), true);
        assert_eq!(without_host.header_line("Host"), "other.example.com");
    }

    #[test]
    fn with_uri_without_host_keeps_header() {
        let request = Request::new(Method::GET, uri("http://example.com/"));
        let updated = request.with_uri(uri("/only/path"), false);
        assert_eq!(updated.header_line("Host"), "example.com");
    }

    #[test]
    fn methods_are_case_sensitive() {
        let request = Request::default();
        assert_eq!(request.method(), Method::GET);

        let patched = request.with_method("PATCH").unwrap();
        assert_eq!(patched.method(), Method::PATCH);

        let custom = request.with_method("purge").unwrap();
        assert_eq!(custom.method().as_str(), "purge");

        assert!(matches!(request.with_method(""), Err(MessageError::InvalidMethod { .. })));
        assert!(matches!(request.with_method("GE T"), Err(MessageError::InvalidMethod { .. })));
    }

    #[test]
    fn builder_collects_parts() {
        let request = Request::builder()
            .method("PUT")
            .uri("https://api.example.com/items/1")
            .header("Content-Type", "application/json")
            .header("X-Trace", "a")
            .header("x-trace", "b")
            .protocol_version("2.0")
            .body(r#"{"a":1}"#)
            .build()
            .unwrap();

        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.header_line("x-trace"), "a,b");
        assert_eq!(request.header_line("host"), "api.example.com");
        assert_eq!(request.protocol_version().as_str(), "2.0");
        assert_eq!(request.body().to_string(), r#"{"a":1}"#);
    }

    #[test]
    fn builder_keeps_explicit_host() {
        let request = Request::builder().uri("http://example.com").header("Host", "proxy.local").build().unwrap();
        assert_eq!(request.header("host"), ["proxy.local".to_owned()]);
    }

    #[test]
    fn builder_reports_first_error() {
        let result = Request::builder().uri("ftp://example.com").method("").build();
        assert!(matches!(result, Err(HttpError::Uri { source: UriError::UnsupportedScheme { .. } })));

        let result = Request::builder().header("bad name", "v").uri("http://example.com").build();
        assert!(matches!(result, Err(HttpError::Message { source: MessageError::InvalidHeaderName { .. } })));
    }
}
