use std::convert::Infallible;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::upload::UploadErrorCode;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("message error: {source}")]
    Message {
        #[from]
        source: MessageError,
    },

    #[error("uri error: {source}")]
    Uri {
        #[from]
        source: UriError,
    },

    #[error("stream error: {source}")]
    Stream {
        #[from]
        source: StreamError,
    },

    #[error("uploaded file error: {source}")]
    UploadedFile {
        #[from]
        source: UploadedFileError,
    },

    #[error("serialize error: {source}")]
    Serialize {
        #[from]
        source: SerializeError,
    },
}

impl From<Infallible> for HttpError {
    fn from(value: Infallible) -> Self {
        match value {}
    }
}

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("`{name}` is not valid header name")]
    InvalidHeaderName { name: String },

    #[error("invalid header value: {reason}")]
    InvalidHeaderValue { reason: String },

    #[error("unsupported http protocol version \"{version}\", supported: \"1.0\", \"1.1\", \"2.0\", \"2\"")]
    UnsupportedProtocolVersion { version: String },

    #[error("response status code {code} is not valid, it must be in 100..=599")]
    InvalidStatusCode { code: u16 },

    #[error("invalid http method `{method}`")]
    InvalidMethod { method: String },

    #[error("request target `{target}` is not valid, it cannot contain whitespace")]
    InvalidRequestTarget { target: String },

    #[error("invalid uploaded files structure: {reason}")]
    InvalidUploadedFilesStructure { reason: String },

    #[error("invalid value in files specification: {reason}")]
    InvalidFilesSpecification { reason: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("can't deserialize params: {reason}")]
    Deserialize { reason: String },
}

impl MessageError {
    pub fn invalid_header_name<S: ToString>(name: S) -> Self {
        Self::InvalidHeaderName { name: name.to_string() }
    }

    pub fn invalid_header_value<S: ToString>(str: S) -> Self {
        Self::InvalidHeaderValue { reason: str.to_string() }
    }

    pub fn unsupported_protocol_version<S: ToString>(version: S) -> Self {
        Self::UnsupportedProtocolVersion { version: version.to_string() }
    }

    pub fn invalid_method<S: ToString>(method: S) -> Self {
        Self::InvalidMethod { method: method.to_string() }
    }

    pub fn invalid_uploaded_files_structure<S: ToString>(str: S) -> Self {
        Self::InvalidUploadedFilesStructure { reason: str.to_string() }
    }

    pub fn invalid_files_specification<S: ToString>(str: S) -> Self {
        Self::InvalidFilesSpecification { reason: str.to_string() }
    }

    pub fn invalid_argument<S: ToString>(str: S) -> Self {
        Self::InvalidArgument { reason: str.to_string() }
    }

    pub fn deserialize<S: ToString>(str: S) -> Self {
        Self::Deserialize { reason: str.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum UriError {
    #[error("unsupported scheme \"{scheme}\", must be an empty string or one of (http, https)")]
    UnsupportedScheme { scheme: String },

    #[error("invalid port {port}, must be a valid TCP/UDP port")]
    InvalidPort { port: u32 },

    #[error("invalid path provided: {reason}")]
    InvalidPath { reason: String },

    #[error("invalid query string provided: {reason}")]
    InvalidQuery { reason: String },

    #[error("invalid host `{host}`")]
    InvalidHost { host: String },

    #[error("the uri `{uri}` appears to be malformed: {reason}")]
    MalformedUri { uri: String, reason: String },
}

impl UriError {
    pub fn invalid_path<S: ToString>(str: S) -> Self {
        Self::InvalidPath { reason: str.to_string() }
    }

    pub fn invalid_query<S: ToString>(str: S) -> Self {
        Self::InvalidQuery { reason: str.to_string() }
    }

    pub fn malformed<U: ToString, S: ToString>(uri: U, reason: S) -> Self {
        Self::MalformedUri { uri: uri.to_string(), reason: reason.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("no resource available, cannot {operation}")]
    StreamUnavailable { operation: &'static str },

    #[error("stream is not readable")]
    StreamNotReadable,

    #[error("stream is not writable")]
    StreamNotWritable,

    #[error("stream is not seekable")]
    StreamNotSeekable,

    #[error("invalid stream mode `{mode}`")]
    InvalidMode { mode: String },

    #[error("the stream or file `{}` cannot be opened: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl StreamError {
    pub fn unavailable(operation: &'static str) -> Self {
        Self::StreamUnavailable { operation }
    }

    pub fn invalid_mode<S: ToString>(mode: S) -> Self {
        Self::InvalidMode { mode: mode.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum UploadedFileError {
    #[error("{code} is not a valid upload error status")]
    InvalidUploadError { code: i64 },

    #[error("{}", code.description())]
    UploadError { code: UploadErrorCode },

    #[error("the uploaded file has already been moved")]
    AlreadyMoved,

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("the target directory `{}` does not exist or is not writable", directory.display())]
    TargetNotWritable { directory: PathBuf },

    #[error("uploaded file could not be moved to `{}`: {source}", target.display())]
    MoveFailed { target: PathBuf, source: io::Error },

    #[error("stream error: {source}")]
    Stream {
        #[from]
        source: StreamError,
    },
}

impl UploadedFileError {
    pub fn invalid_argument<S: ToString>(str: S) -> Self {
        Self::InvalidArgument { reason: str.to_string() }
    }

    pub fn move_failed<P: Into<PathBuf>, E: Into<io::Error>>(target: P, e: E) -> Self {
        Self::MoveFailed { target: target.into(), source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("no status line detected in `{line}`")]
    MalformedStatusLine { line: String },

    #[error("malformed header block: {reason}")]
    MalformedHeader { reason: String },

    #[error("message error: {source}")]
    Message {
        #[from]
        source: MessageError,
    },

    #[error("stream error: {source}")]
    Stream {
        #[from]
        source: StreamError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SerializeError {
    pub fn invalid_argument<S: ToString>(str: S) -> Self {
        Self::InvalidArgument { reason: str.to_string() }
    }

    pub fn malformed_status_line<S: ToString>(line: S) -> Self {
        Self::MalformedStatusLine { line: line.to_string() }
    }

    pub fn malformed_header<S: ToString>(str: S) -> Self {
        Self::MalformedHeader { reason: str.to_string() }
    }
}
