//! Immutable HTTP message, uri and stream value types
//!
//! This crate models HTTP traffic as values: requests, responses, server-side
//! requests, uploaded files and the uris they reference. Nothing is changed in
//! place; every `with_*` method returns a new value that shares whatever it
//! did not touch with the original.
//!
//! # Features
//!
//! - Case-insensitive headers that keep the casing they were given
//! - Header injection checks and filters ([`header_security`])
//! - RFC 3986 uri parsing and percent-encoding ([`Uri`])
//! - A byte [`Stream`] over files, memory and pipes, shared by messages as a [`Body`]
//! - Uploaded files that can be moved exactly once ([`UploadedFile`])
//! - Server requests built from a CGI style environment ([`Environment`])
//! - HTTP/1 wire format parsing and serialization of responses ([`codec`])
//! - Conversions from and to the [`http`] crate types
//!
//! # Example
//!
//! ```
//! use micro_message::{HttpMessage, Request, RequestMessage, Uri};
//!
//! let uri = Uri::parse("http://example.com/items?page=2").unwrap();
//! let request = Request::new(http::Method::GET, uri);
//! assert_eq!(request.header_line("Host"), "example.com");
//! assert_eq!(request.request_target(), "/items?page=2");
//!
//! let moved = request.with_uri(Uri::parse("http://example.com:8080/other").unwrap(), false);
//! assert_eq!(moved.header_line("Host"), "example.com:8080");
//! assert_eq!(request.header_line("Host"), "example.com");
//!
//! let json = moved.with_header("Accept", "application/json").unwrap();
//! assert!(json.has_header("accept"));
//! assert!(!moved.has_header("accept"));
//! ```

pub mod codec;
pub mod interop;
pub mod protocol;
pub mod stream;
pub mod upload;
pub mod uri;

mod utils;

pub use codec::{ResponseEncoder, parse, parse_bytes, serialize};
pub use protocol::header_security;
pub use protocol::{
    Attributes, Environment, HeaderValues, Headers, HttpError, HttpMessage, MessageError, MessageParts, Params,
    ParsedBody, ProtocolVersion, Request, RequestBuilder, RequestLine, RequestMessage, Response, ResponseBuilder,
    SerializeError, ServerParams, ServerRequest, StreamError, UploadedFileError, UriError, normalize_files,
    reason_phrase, uri_from_server,
};
pub use stream::{BODY_FRAME_SIZE, Body, Handle, Metadata, OpenMode, Stream};
pub use upload::{MOVE_CHUNK_SIZE, UploadErrorCode, UploadSource, UploadedFile, UploadedFiles};
pub use uri::Uri;
