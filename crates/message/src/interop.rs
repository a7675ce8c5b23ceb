//! Conversions from and to the [`http`] crate types.
//!
//! Header names coming from [`http`] are lower-cased, so converted requests
//! render them that way. A custom reason phrase has no place in
//! [`http::Response`] and is dropped.

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode, Version};

use crate::protocol::{HttpError, HttpMessage, MessageError, ProtocolVersion, Request, Response, UriError};
use crate::uri::Uri;

impl TryFrom<&Uri> for http::Uri {
    type Error = UriError;

    fn try_from(uri: &Uri) -> Result<Self, Self::Error> {
        http::Uri::try_from(uri.as_str()).map_err(|e| UriError::malformed(uri.as_str(), e))
    }
}

impl TryFrom<&http::Uri> for Uri {
    type Error = UriError;

    fn try_from(uri: &http::Uri) -> Result<Self, Self::Error> {
        Uri::parse(&uri.to_string())
    }
}

impl From<ProtocolVersion> for Version {
    fn from(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::Http10 => Version::HTTP_10,
            ProtocolVersion::Http11 => Version::HTTP_11,
            ProtocolVersion::Http20 | ProtocolVersion::Http2 => Version::HTTP_2,
        }
    }
}

impl TryFrom<Version> for ProtocolVersion {
    type Error = MessageError;

    fn try_from(version: Version) -> Result<Self, Self::Error> {
        match version {
            Version::HTTP_10 => Ok(ProtocolVersion::Http10),
            Version::HTTP_11 => Ok(ProtocolVersion::Http11),
            Version::HTTP_2 => Ok(ProtocolVersion::Http20),
            other => Err(MessageError::unsupported_protocol_version(format!("{other:?}"))),
        }
    }
}

impl TryFrom<&Response> for http::Response<Bytes> {
    type Error = MessageError;

    fn try_from(response: &Response) -> Result<Self, Self::Error> {
        let status = StatusCode::from_u16(response.status_code()).map_err(MessageError::invalid_argument)?;

        let mut builder = http::Response::builder().status(status).version(response.protocol_version().into());
        for (name, values) in response.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| MessageError::invalid_header_name(format!("{name}: {e}")))?;
            for value in values {
                let value = HeaderValue::from_str(value).map_err(MessageError::invalid_header_value)?;
                builder = builder.header(&name, value);
            }
        }

        builder.body(response.body().bytes()).map_err(MessageError::invalid_argument)
    }
}

impl TryFrom<http::Request<Bytes>> for Request {
    type Error = HttpError;

    fn try_from(request: http::Request<Bytes>) -> Result<Self, Self::Error> {
        let (parts, body) = request.into_parts();
        let version = ProtocolVersion::try_from(parts.version)?;

        let mut builder =
            Request::builder().method(parts.method.as_str()).uri(&parts.uri).protocol_version(version.as_str());
        for (name, value) in &parts.headers {
            builder = builder.header(name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        builder.body(body).build()
    }
}
