//! Building a [`ServerRequest`] from the environment of a CGI style process.
//!
//! [`Environment`] is a plain snapshot: server variables, headers, the
//! already decoded query/cookie/form data when the host provides it, the raw
//! uploaded-files specification and the body. It derives [`Deserialize`] so a
//! snapshot can be loaded from a JSON fixture, or taken from the running
//! process with [`Environment::from_process`].
//!
//! [`ServerRequest::from_environment`] is the only place where untrusted
//! environment data enters the message model: header values go through
//! [`header_security::filter`] and every other component through the usual
//! validating `with_*` methods.

use std::env;
use std::io;
use std::path::PathBuf;

use http::Method;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::protocol::header_security;
use crate::protocol::message::HttpMessage;
use crate::protocol::request::{Request, RequestMessage};
use crate::protocol::server_request::{Params, ParsedBody, ServerParams, ServerRequest};
use crate::protocol::{HttpError, MessageError, UriError};
use crate::stream::{Body, Stream};
use crate::upload::{UploadedFile, UploadedFiles};
use crate::uri::Uri;

/// Server variables that become headers without the `HTTP_` prefix.
const CONTENT_HEADERS: [&str; 3] = ["CONTENT_TYPE", "CONTENT_LENGTH", "CONTENT_MD5"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Server variables such as `REQUEST_METHOD` and `HTTP_HOST`.
    pub server: ServerParams,
    /// Request headers; derived from the `HTTP_*` server variables when empty.
    pub headers: IndexMap<String, String>,
    /// Decoded query parameters; parsed from the uri query when absent.
    pub query: Option<Params>,
    /// Decoded cookies; parsed from the `Cookie` header when absent.
    pub cookies: Option<Params>,
    /// Decoded form fields; parsed from the body by content type when absent.
    pub post: Option<Params>,
    /// The raw uploaded-files specification, see [`normalize_files`].
    pub files: Value,
    #[serde(skip)]
    pub body: Option<Body>,
}

impl Environment {
    /// Snapshots the variables of the current process, with stdin as the body.
    ///
    /// Variables that are not valid unicode are skipped.
    pub fn from_process() -> Self {
        let server = env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();

        Self { server, body: Some(Body::new(Stream::from_reader(io::stdin()))), ..Self::default() }
    }
}

impl ServerRequest {
    /// Builds a server request from an environment snapshot.
    pub fn from_environment(environment: Environment) -> Result<Self, HttpError> {
        let Environment { server, headers, query, cookies, post, files, body } = environment;

        let method = server.get("REQUEST_METHOD").map_or("GET", String::as_str);
        let protocol = server.get("SERVER_PROTOCOL").map_or("1.1", |protocol| {
            protocol.strip_prefix("HTTP/").unwrap_or(protocol)
        });
        let uri = uri_from_server(&server)?;
        trace!(method, protocol, uri = %uri, "building server request from environment");

        let headers = if headers.is_empty() { headers_from_server(&server) } else { headers };

        let mut builder = Request::builder().method(method).uri(uri).protocol_version(protocol);
        for (name, value) in &headers {
            builder = builder.header(name, filter_header_value(value));
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let request = builder.build()?;

        let query = match query {
            Some(query) => query,
            None => parse_urlencoded(request.uri().query()),
        };
        let cookies = match cookies {
            Some(cookies) => cookies,
            None => parse_cookies(&request.header_line("Cookie")),
        };
        let parsed_body = match post {
            Some(post) => Some(ParsedBody::from(post)),
            None => parse_body(&request),
        };
        let uploaded_files = normalize_files(&files)?;
        debug!(
            query_params = query.len(),
            cookies = cookies.len(),
            uploaded_files = uploaded_files.files().len(),
            "server request built from environment"
        );

        let server_request = ServerRequest::new(request, server)
            .with_cookie_params(cookies)
            .with_query_params(query)
            .with_parsed_body(parsed_body)?
            .with_uploaded_files(uploaded_files)?;
        Ok(server_request)
    }
}

/// Reconstructs the request uri from the server variables.
///
/// The host comes from `HTTP_HOST`, then `SERVER_NAME`, then `SERVER_ADDR`.
/// `SERVER_PORT` is used when the host carries no port, and `QUERY_STRING`
/// when `REQUEST_URI` carries no query.
pub fn uri_from_server(server: &ServerParams) -> Result<Uri, UriError> {
    let https = server.get("HTTPS").is_some_and(|https| !https.is_empty() && https != "off");
    let mut uri = Uri::new().with_scheme(if https { "https" } else { "http" })?;

    let mut has_port = false;
    if let Some(authority) = server.get("HTTP_HOST") {
        // a malformed Host header leaves host and port unset
        if let Ok(host) = Uri::parse(&format!("//{authority}")) {
            uri = uri.with_host(host.host())?;
            if let Some(port) = host.port() {
                has_port = true;
                uri = uri.with_port(Some(u32::from(port)))?;
            }
        }
    } else if let Some(name) = server.get("SERVER_NAME") {
        uri = uri.with_host(name)?;
    } else if let Some(address) = server.get("SERVER_ADDR") {
        uri = uri.with_host(address)?;
    }

    if !has_port {
        if let Some(port) = server.get("SERVER_PORT").and_then(|port| port.parse::<u32>().ok()) {
            uri = uri.with_port(Some(port))?;
        }
    }

    let mut has_query = false;
    if let Some(request_uri) = server.get("REQUEST_URI") {
        let (path, query) = match request_uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (request_uri.as_str(), None),
        };
        uri = uri.with_path(path)?;
        if let Some(query) = query {
            has_query = true;
            uri = uri.with_query(query)?;
        }
    }

    if !has_query {
        if let Some(query) = server.get("QUERY_STRING") {
            uri = uri.with_query(query)?;
        }
    }

    Ok(uri)
}

/// Collects the `HTTP_*` and content server variables as headers.
///
/// `HTTP_ACCEPT_LANGUAGE` becomes `Accept-Language`.
fn headers_from_server(server: &ServerParams) -> IndexMap<String, String> {
    server
        .iter()
        .filter_map(|(key, value)| {
            let name = match key.strip_prefix("HTTP_") {
                Some(name) => name,
                None if CONTENT_HEADERS.contains(&key.as_str()) => key,
                None => return None,
            };
            Some((header_name(name), value.clone()))
        })
        .collect()
}

fn header_name(variable: &str) -> String {
    variable
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

// folded lines are unfolded, the message model keeps single line values
fn filter_header_value(value: &str) -> String {
    header_security::filter(value).replace("\r\n", "")
}

fn parse_urlencoded(input: &str) -> Params {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(input).unwrap_or_default();
    pairs.into_iter().map(|(key, value)| (key, Value::String(value))).collect()
}

/// Cookie values are kept as sent, without percent-decoding.
fn parse_cookies(header: &str) -> Params {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_owned(), Value::String(value.trim().to_owned())))
        })
        .collect()
}

/// Parses a `POST` body as a form or as JSON, depending on its content type.
///
/// Only seekable bodies are parsed, and they are rewound afterwards so the
/// raw content stays readable.
fn parse_body(request: &Request) -> Option<ParsedBody> {
    if *request.method() != Method::POST {
        return None;
    }

    let content_type = request.header_line("Content-Type");
    let media_type = content_type.parse::<mime::Mime>().ok()?;

    let body = request.body();
    let content = {
        let mut stream = body.lock();
        if !stream.is_seekable() {
            debug!("body is not seekable, skip parsing");
            return None;
        }
        let content = stream.read_all();
        stream.rewind().ok()?;
        content
    };

    if media_type.type_() != mime::APPLICATION {
        return None;
    }

    if media_type.subtype() == mime::WWW_FORM_URLENCODED {
        let input = String::from_utf8_lossy(&content);
        Some(ParsedBody::from(parse_urlencoded(&input)))
    } else if media_type.subtype() == mime::JSON {
        match serde_json::from_slice::<Value>(&content) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(ParsedBody::Structured(value)),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "ignore malformed json body");
                None
            }
        }
    } else {
        None
    }
}

/// Normalizes a raw uploaded-files specification into an [`UploadedFiles`] tree.
///
/// The specification is a mapping of field names. A value holding a
/// `tmp_name` describes a file with `tmp_name`, `size`, `error`, `name` and
/// `type` entries. When `tmp_name` is itself a list or mapping, every entry
/// holds parallel lists or mappings and one file is created per key. Any
/// other mapping is a nested group of fields.
///
/// ```
/// use micro_message::normalize_files;
/// use serde_json::json;
///
/// let files = normalize_files(&json!({
///     "avatar": {"tmp_name": "/tmp/php1", "size": 10, "error": 0, "name": "me.png", "type": "image/png"}
/// }))
/// .unwrap();
///
/// let avatar = files.get("avatar").and_then(|files| files.as_file()).unwrap();
/// assert_eq!(avatar.size(), 10);
/// assert_eq!(avatar.client_filename(), Some("me.png"));
/// ```
pub fn normalize_files(files: &Value) -> Result<UploadedFiles, HttpError> {
    match files {
        Value::Null => Ok(UploadedFiles::default()),
        Value::Object(files) => normalize_mapping(files),
        _ => Err(MessageError::invalid_files_specification("uploaded files must be a mapping").into()),
    }
}

fn normalize_mapping(files: &Map<String, Value>) -> Result<UploadedFiles, HttpError> {
    files
        .iter()
        .map(|(key, value)| {
            let normalized = match value {
                Value::Object(spec) if spec.get("tmp_name").is_some_and(|path| !path.is_null()) => file_from_spec(spec)?,
                Value::Object(nested) => normalize_mapping(nested)?,
                _ => {
                    return Err(MessageError::invalid_files_specification(format!("invalid value for `{key}`")).into());
                }
            };
            Ok((key.clone(), normalized))
        })
        .collect()
}

fn file_from_spec(spec: &Map<String, Value>) -> Result<UploadedFiles, HttpError> {
    let keys: Vec<String> = match spec.get("tmp_name") {
        Some(Value::String(path)) => return Ok(UploadedFiles::File(file_from_leaf(path, spec)?)),
        Some(Value::Array(paths)) => (0..paths.len()).map(|index| index.to_string()).collect(),
        Some(Value::Object(paths)) => paths.keys().cloned().collect(),
        _ => return Err(MessageError::invalid_files_specification("`tmp_name` must be a string").into()),
    };

    keys.into_iter()
        .map(|key| {
            let nested: Map<String, Value> = ["tmp_name", "size", "error", "name", "type"]
                .into_iter()
                .map(|field| (field.to_owned(), pick(spec.get(field), &key)))
                .collect();
            Ok((key, file_from_spec(&nested)?))
        })
        .collect()
}

fn pick(field: Option<&Value>, key: &str) -> Value {
    let picked = match field {
        Some(Value::Array(items)) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        Some(Value::Object(entries)) => entries.get(key),
        _ => None,
    };
    picked.cloned().unwrap_or(Value::Null)
}

fn file_from_leaf(path: &str, spec: &Map<String, Value>) -> Result<UploadedFile, HttpError> {
    let size = integer(spec.get("size"), "size")?;
    let size = u64::try_from(size)
        .map_err(|e| MessageError::invalid_files_specification(format!("invalid `size`: {e}")))?;
    let error = integer(spec.get("error"), "error")?;
    let client_filename = text(spec.get("name"), "name")?;
    let client_media_type = text(spec.get("type"), "type")?;

    Ok(UploadedFile::from_server_upload(PathBuf::from(path), size, error, client_filename, client_media_type)?)
}

/// A number or numeric string, missing values count as zero.
fn integer(value: Option<&Value>, field: &str) -> Result<i64, MessageError> {
    let parsed = match value {
        None | Some(Value::Null) => Some(0),
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    parsed.ok_or_else(|| MessageError::invalid_files_specification(format!("`{field}` must be an integer")))
}

fn text(value: Option<&Value>, field: &str) -> Result<Option<String>, MessageError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(MessageError::invalid_files_specification(format!("`{field}` must be a string"))),
    }
}
