//! Immutable HTTP message types.
//!
//! Every message is a value: the `with_*` methods never change the receiver
//! and return a new message that shares whatever it did not touch.
//!
//! # Architecture
//!
//! - **Message core** ([`HttpMessage`], [`MessageParts`]): protocol version,
//!   case-insensitive headers that keep their original casing, and a lazily
//!   created body
//! - **Requests** ([`Request`], [`RequestMessage`]): method, [`Uri`](crate::Uri)
//!   and request target, with the `Host` header kept in sync with the uri
//! - **Responses** ([`Response`]): status code with a reason phrase defaulting
//!   to [`reason_phrase`]
//! - **Server requests** ([`ServerRequest`]): a request plus server params,
//!   query and cookie params, the parsed body, uploaded files and attributes
//! - **Environment** ([`Environment`]): builds a [`ServerRequest`] from the
//!   variables of a CGI style process
//! - **Header security** ([`header_security`]): checks and filters against
//!   header injection
//! - **Errors** ([`HttpError`] and one error type per concern)

mod message;
pub use message::HeaderValues;
pub use message::Headers;
pub use message::HttpMessage;
pub use message::MessageParts;
pub use message::ProtocolVersion;

mod request;
pub use request::Request;
pub use request::RequestBuilder;
pub use request::RequestLine;
pub use request::RequestMessage;

mod response;
pub use response::Response;
pub use response::ResponseBuilder;
pub use response::reason_phrase;

mod server_request;
pub use server_request::Attributes;
pub use server_request::Params;
pub use server_request::ParsedBody;
pub use server_request::ServerParams;
pub use server_request::ServerRequest;

mod environment;
pub use environment::Environment;
pub use environment::normalize_files;
pub use environment::uri_from_server;

mod error;
pub use error::HttpError;
pub use error::MessageError;
pub use error::SerializeError;
pub use error::StreamError;
pub use error::UploadedFileError;
pub use error::UriError;

pub mod header_security;
