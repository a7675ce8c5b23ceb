//! Wire format of responses.
//!
//! - [`parse`] and [`parse_bytes`] read a response back from its HTTP/1 wire
//!   bytes
//! - [`serialize`] renders a response, and [`ResponseEncoder`] does the same
//!   as a [`tokio_util::codec::Encoder`] for framed writers
//!
//! # Example
//!
//! ```
//! use micro_message::{parse_bytes, serialize, HttpMessage, Response};
//!
//! let response = Response::builder().status(404).header("Content-Type", "text/plain").body("gone").build().unwrap();
//!
//! let wire = serialize(&response);
//! assert_eq!(wire, "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\n\r\ngone");
//!
//! let parsed = parse_bytes(&wire).unwrap();
//! assert_eq!(parsed.status_code(), 404);
//! assert_eq!(parsed.body().to_string(), "gone");
//! ```

mod response_encoder;
mod serializer;

pub use response_encoder::ResponseEncoder;
pub use serializer::parse;
pub use serializer::parse_bytes;
pub use serializer::serialize;
