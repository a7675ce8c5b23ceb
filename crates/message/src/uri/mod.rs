//! URI value type with RFC 3986 percent-encoding.
//!
//! A [`Uri`] is parsed once from a string, or derived from another through the
//! `with_*` methods. Every component is kept in its encoded form:
//!
//! - the scheme is lower-cased and must be empty, `http` or `https`
//! - the host is lower-cased
//! - path, query and fragment bytes outside their allowed sets are
//!   percent-encoded, existing `%XX` escapes are kept as they are
//!
//! The rendered string is computed on first use and cached.
//!
//! # Example
//!
//! ```
//! use micro_message::Uri;
//!
//! let uri: Uri = "HTTPS://Example.com:443/a b?q=1#top".parse().unwrap();
//! assert_eq!(uri.scheme(), "https");
//! assert_eq!(uri.port(), None);
//! assert_eq!(uri.to_string(), "https://example.com/a%20b?q=1#top");
//! ```

mod encode;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::OnceCell;

use crate::protocol::UriError;
use crate::utils::ensure;
use encode::{is_path_byte, is_query_byte, is_user_info_byte, percent_encode};

/// Supported schemes with their default port.
const SCHEMES: [(&str, u16); 2] = [("http", 80), ("https", 443)];

/// The default port of a supported scheme.
pub fn default_port(scheme: &str) -> Option<u16> {
    SCHEMES.iter().find(|(name, _)| *name == scheme).map(|&(_, port)| port)
}

#[derive(Clone, Default)]
pub struct Uri {
    scheme: String,
    user_info: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: String,
    fragment: String,
    rendered: OnceCell<String>,
}

impl Uri {
    /// An empty URI, rendering as the empty string.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(uri: &str) -> Result<Self, UriError> {
        if uri.is_empty() {
            return Ok(Self::default());
        }

        let (rest, fragment) = match uri.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (uri, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };
        let (scheme, rest) = match split_scheme(rest) {
            Some((scheme, rest)) => (Some(scheme), rest),
            None => (None, rest),
        };
        let (authority, path) = match rest.strip_prefix("//") {
            Some(after) => {
                let end = after.find('/').unwrap_or(after.len());
                (Some(&after[..end]), &after[end..])
            }
            None => (None, rest),
        };

        let mut parsed = Self::default();

        if let Some(scheme) = scheme {
            parsed.scheme = filter_scheme(scheme)?;
        }

        if let Some(authority) = authority {
            let (user_info, host_port) = match authority.rsplit_once('@') {
                Some((user_info, host_port)) => (Some(user_info), host_port),
                None => (None, authority),
            };
            let (host, port) =
                split_host_port(host_port).ok_or_else(|| UriError::malformed(uri, "invalid host or port"))?;
            ensure!(!host.is_empty() || scheme.is_none(), UriError::malformed(uri, "missing host"));

            if let Some(user_info) = user_info {
                let (user, password) = match user_info.split_once(':') {
                    Some((user, password)) => (user, Some(password)),
                    None => (user_info, None),
                };
                parsed.user_info = filter_user_info(user, password);
            }
            parsed.host = filter_host(host)?;
            parsed.port = port;
        }

        parsed.path = percent_encode(path, is_path_byte).into_owned();
        if let Some(query) = query {
            parsed.query = filter_query(query);
        }
        if let Some(fragment) = fragment {
            parsed.fragment = percent_encode(fragment, is_query_byte).into_owned();
        }

        Ok(parsed)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// `user[:password]`, percent-encoded.
    pub fn user_info(&self) -> &str {
        &self.user_info
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, or `None` when absent or equal to the default port of the scheme.
    pub fn port(&self) -> Option<u16> {
        self.port.filter(|&port| self.is_non_standard_port(port))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// `[user_info@]host[:port]`, empty when there is no host.
    pub fn authority(&self) -> String {
        if self.host.is_empty() {
            return String::new();
        }

        let mut authority = String::with_capacity(self.user_info.len() + self.host.len() + 7);
        if !self.user_info.is_empty() {
            authority.push_str(&self.user_info);
            authority.push('@');
        }
        authority.push_str(&self.host);
        if let Some(port) = self.port() {
            authority.push(':');
            authority.push_str(&port.to_string());
        }
        authority
    }

    pub fn with_scheme(&self, scheme: &str) -> Result<Self, UriError> {
        let scheme = filter_scheme(scheme)?;
        if scheme == self.scheme {
            return Ok(self.clone());
        }
        Ok(self.derive(|uri| uri.scheme = scheme))
    }

    #[must_use]
    pub fn with_user_info(&self, user: &str, password: Option<&str>) -> Self {
        let user_info = filter_user_info(user, password);
        if user_info == self.user_info {
            return self.clone();
        }
        self.derive(|uri| uri.user_info = user_info)
    }

    pub fn with_host(&self, host: &str) -> Result<Self, UriError> {
        let host = filter_host(host)?;
        if host == self.host {
            return Ok(self.clone());
        }
        Ok(self.derive(|uri| uri.host = host))
    }

    /// Sets or removes the port, which must be in `1..=65535`.
    pub fn with_port(&self, port: Option<u32>) -> Result<Self, UriError> {
        let port = match port {
            Some(port) => Some(
                u16::try_from(port).ok().filter(|&port| port != 0).ok_or(UriError::InvalidPort { port })?,
            ),
            None => None,
        };
        if port == self.port {
            return Ok(self.clone());
        }
        Ok(self.derive(|uri| uri.port = port))
    }

    pub fn with_path(&self, path: &str) -> Result<Self, UriError> {
        ensure!(!path.contains('?'), UriError::invalid_path("must not contain a query string"));
        ensure!(!path.contains('#'), UriError::invalid_path("must not contain a URI fragment"));

        let path = percent_encode(path, is_path_byte);
        if path == self.path {
            return Ok(self.clone());
        }
        let path = path.into_owned();
        Ok(self.derive(|uri| uri.path = path))
    }

    /// Sets the query, a leading `?` is ignored.
    pub fn with_query(&self, query: &str) -> Result<Self, UriError> {
        ensure!(!query.contains('#'), UriError::invalid_query("must not include a URI fragment"));

        let query = filter_query(query);
        if query == self.query {
            return Ok(self.clone());
        }
        Ok(self.derive(|uri| uri.query = query))
    }

    /// Sets the fragment, a leading `#` is ignored.
    #[must_use]
    pub fn with_fragment(&self, fragment: &str) -> Self {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        let fragment = percent_encode(fragment, is_query_byte);
        if fragment == self.fragment {
            return self.clone();
        }
        let fragment = fragment.into_owned();
        self.derive(|uri| uri.fragment = fragment)
    }

    fn derive(&self, update: impl FnOnce(&mut Uri)) -> Self {
        let mut uri = Self { rendered: OnceCell::new(), ..self.clone() };
        update(&mut uri);
        uri
    }

    // a uri without scheme always renders its port
    fn is_non_standard_port(&self, port: u16) -> bool {
        if self.scheme.is_empty() {
            return true;
        }
        if self.host.is_empty() {
            return false;
        }
        default_port(&self.scheme) != Some(port)
    }

    fn render(&self) -> String {
        let mut uri = String::new();

        if !self.scheme.is_empty() {
            uri.push_str(&self.scheme);
            uri.push_str("://");
        }

        uri.push_str(&self.authority());

        if !self.path.is_empty() {
            if !self.path.starts_with('/') {
                uri.push('/');
            }
            uri.push_str(&self.path);
        }

        if !self.query.is_empty() {
            uri.push('?');
            uri.push_str(&self.query);
        }

        if !self.fragment.is_empty() {
            uri.push('#');
            uri.push_str(&self.fragment);
        }

        uri
    }

    /// The rendered URI, computed once.
    pub fn as_str(&self) -> &str {
        self.rendered.get_or_init(|| self.render())
    }
}

impl PartialEq for Uri {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.user_info == other.user_info
            && self.host == other.host
            && self.port == other.port
            && self.path == other.path
            && self.query == other.query
            && self.fragment == other.fragment
    }
}

impl Eq for Uri {}

impl fmt::Debug for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Uri").field(&self.as_str()).finish()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Uri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Uri {
    type Error = UriError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Uri {
    type Error = UriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&String> for Uri {
    type Error = UriError;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

fn split_scheme(input: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = input.split_once(':')?;
    let mut bytes = scheme.bytes();
    let valid = bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'));
    valid.then_some((scheme, rest))
}

fn split_host_port(input: &str) -> Option<(&str, Option<u16>)> {
    let (host, port) = if input.starts_with('[') {
        let end = input.find(']')?;
        let (host, rest) = input.split_at(end + 1);
        if rest.is_empty() {
            (host, None)
        } else {
            (host, Some(rest.strip_prefix(':')?))
        }
    } else {
        match input.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (input, None),
        }
    };

    let port = match port {
        None | Some("") => None,
        Some(port) if port.bytes().all(|b| b.is_ascii_digit()) => Some(port.parse::<u16>().ok().filter(|&p| p != 0)?),
        Some(_) => return None,
    };
    Some((host, port))
}

fn filter_scheme(scheme: &str) -> Result<String, UriError> {
    let scheme = scheme.to_ascii_lowercase();
    let scheme = scheme.strip_suffix("://").or_else(|| scheme.strip_suffix(':')).unwrap_or(&scheme);
    if scheme.is_empty() {
        return Ok(String::new());
    }

    match default_port(scheme) {
        Some(_) => Ok(scheme.to_owned()),
        None => Err(UriError::UnsupportedScheme { scheme: scheme.to_owned() }),
    }
}

fn filter_user_info(user: &str, password: Option<&str>) -> String {
    let mut user_info = percent_encode(user, is_user_info_byte).into_owned();
    if let Some(password) = password.filter(|password| !password.is_empty()) {
        user_info.push(':');
        user_info.push_str(&percent_encode(password, is_user_info_byte));
    }
    user_info
}

fn filter_host(host: &str) -> Result<String, UriError> {
    let valid = if let Some(inner) = host.strip_prefix('[') {
        inner
            .strip_suffix(']')
            .is_some_and(|ip| !ip.is_empty() && ip.bytes().all(|b| b.is_ascii_hexdigit() || matches!(b, b':' | b'.')))
    } else {
        host.bytes().all(|b| is_user_info_byte(b) || b == b'%')
    };

    if valid { Ok(host.to_ascii_lowercase()) } else { Err(UriError::InvalidHost { host: host.to_owned() }) }
}

fn filter_query(query: &str) -> String {
    let query = query.strip_prefix('?').unwrap_or(query);
    percent_encode(query, is_query_byte).into_owned()
}
