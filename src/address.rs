//! Public address resolution.
//!
//! Computes the origin (`scheme://host[:port]`) under which external parties
//! reach this service. The result is computed fresh for every request because
//! proxy headers may legitimately differ between requests.
//!
//! # Precedence
//!
//! The first matching tier wins:
//!
//! 1. `X-Forwarded-Host` (first comma-separated token, trimmed, empty tokens skipped)
//! 2. An absolute-form request target (`GET http://host:port/path`)
//! 3. The `Host` header
//! 4. The local address the connection was accepted on
//!
//! The scheme is determined independently: `X-Forwarded-Ssl: on` forces `https`,
//! otherwise `X-Forwarded-Proto` is taken verbatim, otherwise the tier's default
//! (the configured scheme, or the absolute target's own scheme in tier 2).
//!
//! Absence of a host hint falls through to the next tier. A host hint or
//! request target that is present but unparseable aborts resolution with an
//! [`AddressError`]. Scheme hints are lenient: a blank or non-ASCII value is
//! treated as absent.

use std::fmt;
use std::net::SocketAddr;

use http::header::HeaderMap;
use http::Uri;

use crate::error::AddressError;
use crate::request::Request;

/// Scheme used for plain HTTP.
pub const HTTP_SCHEME: &str = "http";
/// Scheme used for HTTP over TLS.
pub const HTTPS_SCHEME: &str = "https";

/// Proxy header carrying the client-facing host.
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
/// Proxy header carrying the client-facing protocol.
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
/// Proxy header signalling that the client connection used TLS.
pub const X_FORWARDED_SSL: &str = "x-forwarded-ssl";

const HOST_HEADER: &str = "host";

/// Returns the conventional default port for `scheme`, if it has one.
pub fn default_port(scheme: &str) -> Option<u16> {
    if scheme.eq_ignore_ascii_case(HTTP_SCHEME) {
        Some(80)
    } else if scheme.eq_ignore_ascii_case(HTTPS_SCHEME) {
        Some(443)
    } else {
        None
    }
}

/// A resolved externally visible origin.
///
/// The port is never the conventional default for the scheme: constructing an
/// address with `http` and port 80 yields an address without an explicit port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicAddress {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl PublicAddress {
    /// Creates an address, dropping `port` when it is the scheme's default.
    ///
    /// `host` may be given with or without IPv6 brackets.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        let scheme = scheme.into();
        let host = strip_brackets(&host.into()).to_owned();
        let port = port.filter(|p| default_port(&scheme) != Some(*p));
        Self { scheme, host, port }
    }

    /// The scheme, as resolved (forwarded protocol values are kept verbatim).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host, without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The explicit port, or `None` when the scheme default applies.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Appends `path` to the origin, separated by exactly one `/`.
    ///
    /// ```
    /// use auth_gate::PublicAddress;
    ///
    /// let addr = PublicAddress::new("https", "example.com", Some(443));
    /// assert_eq!(addr.join("auth-callback"), "https://example.com/auth-callback");
    /// ```
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self, path.trim_start_matches('/'))
    }
}

impl fmt::Display for PublicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

/// A parsed `host[:port]` hint.
///
/// Parsing follows the usual host-and-port conventions: bracketed IPv6
/// literals may carry a port, an unbracketed value with several colons is an
/// IPv6 literal without a port, and a trailing bare colon means "no port".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAndPort {
    host: String,
    port: Option<u16>,
}

/// Host hint taken from the forwarded-host header.
pub type ForwardedHostHint = HostAndPort;

impl HostAndPort {
    /// Parses a `host[:port]` value taken from the header named `header`.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::MalformedHostSpecification`] for an empty host,
    /// invalid host characters, an unterminated IPv6 literal, or a port that is
    /// not a decimal number in `0..=65535`.
    pub fn parse(header: &'static str, value: &str) -> Result<Self, AddressError> {
        let malformed = |reason| AddressError::MalformedHostSpecification {
            header,
            value: value.to_owned(),
            reason,
        };

        let (host, port_text) = if let Some(rest) = value.strip_prefix('[') {
            let close = rest.find(']').ok_or_else(|| malformed("unterminated IPv6 literal"))?;
            let host = &rest[..close];
            let after = &rest[close + 1..];
            let port_text = match after.strip_prefix(':') {
                Some(port) => Some(port),
                None if after.is_empty() => None,
                None => return Err(malformed("unexpected characters after IPv6 literal")),
            };
            if !host.chars().all(is_ipv6_char) {
                return Err(malformed("invalid IPv6 literal"));
            }
            (host, port_text)
        } else {
            match value.matches(':').count() {
                0 => (value, None),
                1 => {
                    let (host, port) = value.split_once(':').unwrap_or((value, ""));
                    (host, Some(port))
                }
                _ => {
                    if !value.chars().all(is_ipv6_char) {
                        return Err(malformed("invalid IPv6 literal"));
                    }
                    (value, None)
                }
            }
        };

        if host.is_empty() {
            return Err(malformed("empty host"));
        }
        if !host.contains(':') && !host.chars().all(is_reg_name_char) {
            return Err(malformed("invalid host characters"));
        }

        let port = match port_text {
            None | Some("") => None,
            Some(text) => {
                if !text.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed("port is not numeric"));
                }
                Some(text.parse::<u16>().map_err(|_| malformed("port out of range"))?)
            }
        };

        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }

    /// The host, without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, if one was given.
    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

fn is_reg_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '-' | '.' | '_' | '~' | '%' | '!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+' | ';' | '='
        )
}

fn is_ipv6_char(c: char) -> bool {
    c.is_ascii_hexdigit() || c == ':' || c == '.'
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Source of the public address for a request.
///
/// Implementations are stateless with respect to requests and may be shared
/// freely across threads.
pub trait PublicAddressSource: Send + Sync {
    /// Resolves the public address for `request`.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] when an explicit hint is malformed.
    fn public_address(&self, request: &Request) -> Result<PublicAddress, AddressError>;
}

/// Infers the public address from request headers and the local bind address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferringPublicAddress {
    default_scheme: String,
}

impl InferringPublicAddress {
    /// Creates a resolver falling back to `default_scheme`.
    pub fn new(default_scheme: impl Into<String>) -> Self {
        Self {
            default_scheme: default_scheme.into(),
        }
    }

    /// Resolves from raw request parts. See [`resolve`].
    ///
    /// # Errors
    ///
    /// See [`resolve`].
    pub fn resolve(
        &self,
        headers: &HeaderMap,
        raw_target: &str,
        local_addr: SocketAddr,
    ) -> Result<PublicAddress, AddressError> {
        resolve(headers, raw_target, local_addr, &self.default_scheme)
    }
}

impl Default for InferringPublicAddress {
    fn default() -> Self {
        Self::new(HTTP_SCHEME)
    }
}

impl PublicAddressSource for InferringPublicAddress {
    fn public_address(&self, request: &Request) -> Result<PublicAddress, AddressError> {
        self.resolve(request.headers(), request.raw_uri(), request.local_addr())
    }
}

/// A fixed, configured public address. Request hints are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPublicAddress {
    address: PublicAddress,
}

impl FixedPublicAddress {
    /// Wraps an already resolved address.
    pub fn new(address: PublicAddress) -> Self {
        Self { address }
    }

    /// Parses an absolute origin such as `https://example.com:8443`.
    ///
    /// A trailing `/` is accepted; any other path, query or missing host is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::InvalidConfiguredAddress`] for anything that is
    /// not a bare absolute origin.
    pub fn parse(value: &str) -> Result<Self, AddressError> {
        let invalid = |reason| AddressError::InvalidConfiguredAddress {
            value: value.to_owned(),
            reason,
        };
        let uri: Uri = value.parse().map_err(|_| invalid("not a valid URI"))?;
        let scheme = uri.scheme_str().ok_or_else(|| invalid("missing scheme"))?;
        let host = uri.host().ok_or_else(|| invalid("missing host"))?;
        if !matches!(uri.path(), "" | "/") || uri.query().is_some() {
            return Err(invalid("must not contain a path or query"));
        }
        Ok(Self::new(PublicAddress::new(scheme, host, uri.port_u16())))
    }

    /// The configured address.
    pub fn address(&self) -> &PublicAddress {
        &self.address
    }
}

impl PublicAddressSource for FixedPublicAddress {
    fn public_address(&self, _request: &Request) -> Result<PublicAddress, AddressError> {
        Ok(self.address.clone())
    }
}

/// Resolves the public address from raw request parts.
///
/// Pure function of its inputs: resolving the same input twice yields the same
/// address.
///
/// ```
/// use auth_gate::address::resolve;
/// use http::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("host", "example.com".parse().unwrap());
///
/// let addr = resolve(&headers, "/index.html", "10.0.0.1:8080".parse().unwrap(), "http").unwrap();
/// assert_eq!(addr.to_string(), "http://example.com");
/// ```
///
/// # Errors
///
/// Returns [`AddressError::MalformedHostSpecification`] when a forwarded-host
/// or `Host` header is present but unparseable, and
/// [`AddressError::MalformedRequestTarget`] when the request target looks
/// absolute but is not a valid URI.
pub fn resolve(
    headers: &HeaderMap,
    raw_target: &str,
    local_addr: SocketAddr,
    default_scheme: &str,
) -> Result<PublicAddress, AddressError> {
    if let Some(forwarded) = forwarded_host(headers)? {
        let scheme = determine_scheme(headers, default_scheme);
        tracing::trace!(tier = "forwarded-host", host = %forwarded.host, "public address resolved");
        return Ok(PublicAddress::new(scheme, forwarded.host, forwarded.port));
    }

    if let Some(target) = absolute_target(raw_target)? {
        let scheme = determine_scheme(headers, &target.scheme);
        tracing::trace!(tier = "absolute-target", host = %target.host, "public address resolved");
        return Ok(PublicAddress::new(scheme, target.host, target.port));
    }

    let scheme = determine_scheme(headers, default_scheme);

    if let Some(host) = host_header(headers)? {
        tracing::trace!(tier = "host", host = %host.host, "public address resolved");
        return Ok(PublicAddress::new(scheme, host.host, host.port));
    }

    tracing::trace!(tier = "local-address", %local_addr, "public address resolved");
    Ok(PublicAddress::new(
        scheme,
        local_addr.ip().to_string(),
        Some(local_addr.port()),
    ))
}

/// Applies the scheme override rules on top of `default_scheme`.
///
/// Scheme hints that are blank or not visible ASCII count as absent. Unlike a
/// malformed host hint they never abort resolution: every tier already has a
/// scheme to fall back to.
pub fn determine_scheme(headers: &HeaderMap, default_scheme: &str) -> String {
    let ssl_on =
        scheme_hint(headers, X_FORWARDED_SSL).is_some_and(|v| v.eq_ignore_ascii_case("on"));
    if ssl_on {
        return HTTPS_SCHEME.to_owned();
    }

    scheme_hint(headers, X_FORWARDED_PROTO)
        .unwrap_or(default_scheme)
        .to_owned()
}

fn scheme_hint<'a>(headers: &'a HeaderMap, name: &'static str) -> Option<&'a str> {
    let value = headers.get(name)?;
    match value.to_str().map(str::trim) {
        Ok("") => None,
        Ok(text) => Some(text),
        Err(_) => {
            tracing::trace!(header = name, "ignoring non-ASCII scheme hint");
            None
        }
    }
}

fn header_text<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> Result<Option<&'a str>, AddressError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .map(Some)
        .map_err(|_| AddressError::MalformedHostSpecification {
            header: name,
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            reason: "value is not visible ASCII",
        })
}

fn forwarded_host(headers: &HeaderMap) -> Result<Option<ForwardedHostHint>, AddressError> {
    let Some(text) = header_text(headers, X_FORWARDED_HOST)? else {
        return Ok(None);
    };
    text.split(',')
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(|token| HostAndPort::parse(X_FORWARDED_HOST, token))
        .transpose()
}

fn host_header(headers: &HeaderMap) -> Result<Option<HostAndPort>, AddressError> {
    match header_text(headers, HOST_HEADER)?.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => HostAndPort::parse(HOST_HEADER, text).map(Some),
    }
}

struct AbsoluteTarget {
    scheme: String,
    host: String,
    port: Option<u16>,
}

/// Origin-form (`/path`), asterisk-form and authority-form targets are not absolute.
fn absolute_target(raw_target: &str) -> Result<Option<AbsoluteTarget>, AddressError> {
    if raw_target.is_empty() || raw_target.starts_with('/') || raw_target == "*" {
        return Ok(None);
    }

    let malformed = |reason: String| AddressError::MalformedRequestTarget {
        target: raw_target.to_owned(),
        reason,
    };
    let uri: Uri = raw_target.parse().map_err(|e: http::uri::InvalidUri| malformed(e.to_string()))?;

    match (uri.scheme_str(), uri.host()) {
        (None, _) => Ok(None),
        (Some(_), None) => Err(malformed("absolute target without host".to_owned())),
        (Some(scheme), Some(host)) => Ok(Some(AbsoluteTarget {
            scheme: scheme.to_owned(),
            host: host.to_owned(),
            port: uri.port_u16(),
        })),
    }
}
