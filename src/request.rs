//! Request and response surfaces consumed by the gate.
//!
//! These are deliberately framework-neutral: an embedding server builds a
//! [`Request`] from its own request type and supplies a [`Responder`] that
//! writes to its connection.

use std::fmt;
use std::net::SocketAddr;

use http::{Extensions, HeaderMap, Response, StatusCode};

use crate::profile::IdentityProfile;
use crate::session::Session;

/// An in-flight request as seen by the gate.
#[derive(Debug)]
pub struct Request {
    request_id: String,
    raw_uri: String,
    headers: HeaderMap,
    local_addr: SocketAddr,
    session: Session,
    extensions: Extensions,
}

impl Request {
    /// Creates a request with no headers.
    ///
    /// `raw_uri` is the request target exactly as it appeared on the request
    /// line (origin-form path or absolute URI).
    pub fn new(
        request_id: impl Into<String>,
        raw_uri: impl Into<String>,
        local_addr: SocketAddr,
        session: Session,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            raw_uri: raw_uri.into(),
            headers: HeaderMap::new(),
            local_addr,
            session,
            extensions: Extensions::new(),
        }
    }

    /// Replaces the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Request identifier used to correlate log events.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The raw request target.
    pub fn raw_uri(&self) -> &str {
        &self.raw_uri
    }

    /// Path component of the request target (`/` if empty).
    pub fn path(&self) -> &str {
        split_target(&self.raw_uri).0
    }

    /// Query component of the request target, without the `?`.
    pub fn query(&self) -> Option<&str> {
        split_target(&self.raw_uri).1
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The local address the connection was accepted on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The caller's session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Request-scoped values available to downstream handlers.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// The identity profile attached by the gate, if the caller is authenticated.
    pub fn profile(&self) -> Option<&IdentityProfile> {
        self.extensions.get::<IdentityProfile>()
    }

    pub(crate) fn attach_profile(&mut self, profile: IdentityProfile) {
        self.extensions.insert(profile);
    }
}

fn split_target(raw: &str) -> (&str, Option<&str>) {
    let raw = raw.split('#').next().unwrap_or_default();
    let (before_query, query) = match raw.split_once('?') {
        Some((before, query)) => (before, Some(query)),
        None => (raw, None),
    };
    let path = match before_query.find("://") {
        Some(idx) => {
            let rest = &before_query[idx + 3..];
            rest.find('/').map_or("/", |slash| &rest[slash..])
        }
        None if before_query.is_empty() => "/",
        None => before_query,
    };
    (path, query)
}

/// Writes the response for one request.
///
/// Implemented by the embedding server. A responder is used by exactly one
/// request and is never shared.
pub trait Responder: Send {
    /// Sends a redirect with the given status and `Location`.
    fn send_redirect(&mut self, status: StatusCode, location: &str);

    /// Sends a complete response.
    fn send_response(&mut self, response: Response<String>);
}

/// A request paired with the responder that answers it.
pub struct Exchange {
    request: Request,
    responder: Box<dyn Responder>,
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl Exchange {
    /// Pairs `request` with `responder`.
    pub fn new(request: Request, responder: Box<dyn Responder>) -> Self {
        Self { request, responder }
    }

    /// The request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The request, mutably.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Sends a complete response, consuming the exchange.
    pub fn respond(mut self, response: Response<String>) {
        self.responder.send_response(response);
    }

    /// Sends a bare status response, consuming the exchange.
    pub fn respond_status(self, status: StatusCode) {
        let mut response = Response::new(String::new());
        *response.status_mut() = status;
        self.respond(response);
    }

    /// Splits into request and responder.
    pub fn into_parts(self) -> (Request, Box<dyn Responder>) {
        (self.request, self.responder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySessionStore, RecordingResponder};

    fn request(raw: &str) -> Request {
        Request::new(
            "req-1",
            raw,
            "127.0.0.1:8080".parse().unwrap(),
            MemorySessionStore::shared().session("s1"),
        )
    }

    #[test]
    fn path_and_query_from_origin_form() {
        let req = request("/reports/2024?format=csv#top");
        assert_eq!(req.path(), "/reports/2024");
        assert_eq!(req.query(), Some("format=csv"));
    }

    #[test]
    fn path_from_absolute_form() {
        let req = request("https://example.com:8443/a/b?x=1");
        assert_eq!(req.path(), "/a/b");
        assert_eq!(req.query(), Some("x=1"));

        let bare = request("https://example.com");
        assert_eq!(bare.path(), "/");
    }

    #[test]
    fn empty_target_has_root_path() {
        assert_eq!(request("").path(), "/");
    }

    #[test]
    fn profile_is_absent_until_attached() {
        let mut req = request("/");
        assert!(req.profile().is_none());

        req.attach_profile(IdentityProfile::new("alice", "form"));
        assert_eq!(req.profile().unwrap().id, "alice");
        assert!(req.extensions().get::<IdentityProfile>().is_some());
    }

    #[test]
    fn respond_status_sends_empty_body() {
        let responder = RecordingResponder::new();
        let exchange = Exchange::new(request("/"), Box::new(responder.clone()));

        exchange.respond_status(StatusCode::FORBIDDEN);

        let sent = responder.single();
        assert_eq!(sent.status, StatusCode::FORBIDDEN);
        assert!(sent.body.is_empty());
    }
}
