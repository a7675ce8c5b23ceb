//! Server-side requests: a [`Request`] plus everything the server knows about it.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use triomphe::Arc;

use crate::protocol::MessageError;
use crate::protocol::message::{HttpMessage, MessageParts};
use crate::protocol::request::{Request, RequestLine, RequestMessage};
use crate::upload::UploadedFiles;

/// Snapshot of the server environment the request was received in.
pub type ServerParams = BTreeMap<String, String>;

/// Query, cookie and form parameters.
pub type Params = serde_json::Map<String, Value>;

/// Request-scoped attributes.
pub type Attributes = IndexMap<String, Value>;

/// The deserialized request body.
#[derive(Clone)]
pub enum ParsedBody {
    /// A mapping or list, typically decoded from a form or JSON body.
    Structured(Value),
    /// Any value produced by a caller-supplied body parser.
    Object(std::sync::Arc<dyn Any + Send + Sync>),
}

impl ParsedBody {
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        ParsedBody::Object(std::sync::Arc::new(value))
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            ParsedBody::Structured(value) => Some(value),
            ParsedBody::Object(_) => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            ParsedBody::Object(object) => object.downcast_ref(),
            ParsedBody::Structured(_) => None,
        }
    }
}

impl From<Params> for ParsedBody {
    fn from(params: Params) -> Self {
        ParsedBody::Structured(Value::Object(params))
    }
}

impl fmt::Debug for ParsedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedBody::Structured(value) => f.debug_tuple("Structured").field(value).finish(),
            ParsedBody::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl PartialEq for ParsedBody {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParsedBody::Structured(a), ParsedBody::Structured(b)) => a == b,
            (ParsedBody::Object(a), ParsedBody::Object(b)) => std::sync::Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A request as received by a server.
///
/// Every parameter collection is shared between derived requests until it
/// is replaced.
#[derive(Clone, Default)]
pub struct ServerRequest {
    request: Request,
    server_params: Arc<ServerParams>,
    cookie_params: Arc<Params>,
    query_params: Arc<Params>,
    parsed_body: Option<ParsedBody>,
    uploaded_files: Arc<UploadedFiles>,
    attributes: Arc<Attributes>,
}

impl ServerRequest {
    pub fn new(request: Request, server_params: ServerParams) -> Self {
        Self { request, server_params: Arc::new(server_params), ..Self::default() }
    }

    pub fn server_params(&self) -> &ServerParams {
        &self.server_params
    }

    pub fn cookie_params(&self) -> &Params {
        &self.cookie_params
    }

    #[must_use]
    pub fn with_cookie_params(&self, cookies: Params) -> Self {
        Self { cookie_params: Arc::new(cookies), ..self.clone() }
    }

    pub fn query_params(&self) -> &Params {
        &self.query_params
    }

    #[must_use]
    pub fn with_query_params(&self, query: Params) -> Self {
        Self { query_params: Arc::new(query), ..self.clone() }
    }

    /// Deserializes the query string of the uri.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        serde_qs::from_str::<T>(self.uri().query()).map_err(|e| MessageError::deserialize(e.to_string()))
    }

    pub fn parsed_body(&self) -> Option<&ParsedBody> {
        self.parsed_body.as_ref()
    }

    /// Returns a request with the given parsed body.
    ///
    /// A structured body must be a mapping or a list.
    pub fn with_parsed_body(&self, body: Option<ParsedBody>) -> Result<Self, MessageError> {
        if let Some(ParsedBody::Structured(value)) = &body {
            if !(value.is_object() || value.is_array()) {
                return Err(MessageError::invalid_argument(format!(
                    "`{value}` is not valid parsed body, it must be a mapping, a list or an object"
                )));
            }
        }

        Ok(Self { parsed_body: body, ..self.clone() })
    }

    /// Deserializes a structured parsed body.
    pub fn parsed_body_as<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        match &self.parsed_body {
            Some(ParsedBody::Structured(value)) => {
                T::deserialize(value).map_err(|e| MessageError::deserialize(e.to_string()))
            }
            _ => Err(MessageError::deserialize("request has no structured parsed body")),
        }
    }

    pub fn uploaded_files(&self) -> &UploadedFiles {
        &self.uploaded_files
    }

    /// Returns a request with the given uploaded files.
    ///
    /// The root of the tree must be a mapping keyed by field name.
    pub fn with_uploaded_files(&self, files: UploadedFiles) -> Result<Self, MessageError> {
        validate_uploaded_files(&files)?;
        Ok(Self { uploaded_files: Arc::new(files), ..self.clone() })
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attribute_or<'a>(&'a self, name: &str, default: &'a Value) -> &'a Value {
        self.attribute(name).unwrap_or(default)
    }

    #[must_use]
    pub fn with_attribute(&self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if self.attribute(name) == Some(&value) {
            return self.clone();
        }

        let mut request = self.clone();
        Arc::make_mut(&mut request.attributes).insert(name.to_owned(), value);
        request
    }

    #[must_use]
    pub fn without_attribute(&self, name: &str) -> Self {
        if !self.attributes.contains_key(name) {
            return self.clone();
        }

        let mut request = self.clone();
        Arc::make_mut(&mut request.attributes).shift_remove(name);
        request
    }

    /// The underlying request, without the server-side state.
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[cfg(test)]
    fn shares_attributes_with(&self, other: &ServerRequest) -> bool {
        Arc::ptr_eq(&self.attributes, &other.attributes)
    }
}

fn validate_uploaded_files(files: &UploadedFiles) -> Result<(), MessageError> {
    match files {
        UploadedFiles::Nested(_) => Ok(()),
        UploadedFiles::File(_) => Err(MessageError::invalid_uploaded_files_structure(
            "the root of uploaded files must be a mapping of field names",
        )),
    }
}

impl HttpMessage for ServerRequest {
    fn parts(&self) -> &MessageParts {
        self.request.parts()
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        self.request.parts_mut()
    }
}

impl RequestMessage for ServerRequest {
    fn request_line(&self) -> &RequestLine {
        self.request.request_line()
    }

    fn request_line_mut(&mut self) -> &mut RequestLine {
        self.request.request_line_mut()
    }
}

impl From<Request> for ServerRequest {
    fn from(request: Request) -> Self {
        Self::new(request, ServerParams::new())
    }
}

impl fmt::Debug for ServerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRequest")
            .field("request", &self.request)
            .field("query_params", &self.query_params)
            .field("cookie_params", &self.cookie_params)
            .field("parsed_body", &self.parsed_body)
            .field("uploaded_files", &self.uploaded_files)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Body;
    use crate::upload::UploadedFile;
    use crate::uri::Uri;
    use http::Method;
    use serde::Deserialize;
    use serde_json::json;

    fn server_request(uri: &str) -> ServerRequest {
        let request = Request::new(Method::GET, Uri::parse(uri).unwrap());
        let server = [("REQUEST_METHOD".to_owned(), "GET".to_owned())].into_iter().collect();
        ServerRequest::new(request, server)
    }

    #[test]
    fn exposes_request_behaviour() {
        let request = server_request("http://example.com/a?b=c");
        assert_eq!(request.request_target(), "/a?b=c");
        assert_eq!(request.header_line("host"), "example.com");
        assert_eq!(request.server_params().get("REQUEST_METHOD").map(String::as_str), Some("GET"));

        let moved = request.with_uri(Uri::parse("http://other.example.com").unwrap(), false);
        assert_eq!(moved.header_line("host"), "other.example.com");
        assert_eq!(moved.server_params(), request.server_params());
    }

    #[test]
    fn params_are_copy_on_write() {
        let request = server_request("http://example.com");
        let mut query = Params::new();
        query.insert("page".to_owned(), json!("2"));

        let with_query = request.with_query_params(query.clone());
        assert_eq!(with_query.query_params(), &query);
        assert!(request.query_params().is_empty());

        let mut cookies = Params::new();
        cookies.insert("session".to_owned(), json!("abc"));
        let with_cookies = with_query.with_cookie_params(cookies);
        assert_eq!(with_cookies.cookie_params().get("session"), Some(&json!("abc")));
        assert_eq!(with_cookies.query_params(), &query);
    }

    #[test]
    fn attributes() {
        let request = server_request("http://example.com");
        assert!(request.attribute("user").is_none());
        assert_eq!(request.attribute_or("user", &json!("anonymous")), &json!("anonymous"));

        let with_user = request.with_attribute("user", "alice");
        assert_eq!(with_user.attribute("user"), Some(&json!("alice")));
        assert!(request.attributes().is_empty());

        let same = with_user.with_attribute("user", "alice");
        assert!(same.shares_attributes_with(&with_user));

        let removed = with_user.without_attribute("user");
        assert!(removed.attribute("user").is_none());

        let untouched = removed.without_attribute("user");
        assert!(untouched.shares_attributes_with(&removed));
    }

    #[test]
    fn parsed_body() {
        let request = server_request("http://example.com");
        assert!(request.parsed_body().is_none());

        let with_body = request.with_parsed_body(Some(ParsedBody::Structured(json!({"name": "x", "age": 3})))).unwrap();

        #[derive(Deserialize, Debug, PartialEq)]
        struct Person {
            name: String,
            age: u32,
        }
        let person = with_body.parsed_body_as::<Person>().unwrap();
        assert_eq!(person, Person { name: "x".to_owned(), age: 3 });

        assert!(matches!(
            request.with_parsed_body(Some(ParsedBody::Structured(json!("scalar")))),
            Err(MessageError::InvalidArgument { .. })
        ));
        assert!(matches!(request.parsed_body_as::<Person>(), Err(MessageError::Deserialize { .. })));

        let object = request.with_parsed_body(Some(ParsedBody::object(42u8))).unwrap();
        assert_eq!(object.parsed_body().and_then(ParsedBody::downcast_ref::<u8>), Some(&42));

        let cleared = object.with_parsed_body(None).unwrap();
        assert!(cleared.parsed_body().is_none());
    }

    #[test]
    fn query_as() {
        #[derive(Deserialize)]
        struct Paging {
            page: u32,
            sort: String,
        }

        let request = server_request("http://example.com/list?page=3&sort=name");
        let paging = request.query_as::<Paging>().unwrap();
        assert_eq!(paging.page, 3);
        assert_eq!(paging.sort, "name");

        let request = server_request("http://example.com/list?page=x");
        assert!(matches!(request.query_as::<Paging>(), Err(MessageError::Deserialize { .. })));
    }

    #[test]
    fn uploaded_files_root_must_be_mapping() {
        let request = server_request("http://example.com");
        let file = UploadedFile::new(Body::from("x"), 1, 0, None, None).unwrap();

        assert!(matches!(
            request.with_uploaded_files(UploadedFiles::File(file.clone())),
            Err(MessageError::InvalidUploadedFilesStructure { .. })
        ));

        let files = [("avatar", UploadedFiles::File(file))].into_iter().collect();
        let with_files = request.with_uploaded_files(files).unwrap();
        assert_eq!(with_files.uploaded_files().files().len(), 1);
        assert!(request.uploaded_files().is_empty());
    }
}
