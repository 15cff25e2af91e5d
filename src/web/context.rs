use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Response, StatusCode};

use crate::client::ChallengeResponse;
use crate::request::{Exchange, Responder};
use crate::session::{Session, SessionValue};

/// How a [`WebContext`] response was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// A redirect was sent by the identity client
    Redirect,
    /// A provider-issued challenge response was sent
    ChallengeResponse,
    /// The buffered response was sent after the challenge completed
    Completed,
}

/// Per-request façade handed to identity clients.
///
/// Single-request scoped and not shareable: it moves onto the blocking worker
/// that runs the challenge and back to the task that finalizes it.
pub struct WebContext {
    request_id: String,
    raw_uri: String,
    headers: HeaderMap,
    session: Session,
    callback_url: Option<String>,
    responder: Box<dyn Responder>,
    status: StatusCode,
    response_headers: HeaderMap,
    content: String,
    finalized: Option<Finalization>,
}

impl std::fmt::Debug for WebContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebContext")
            .field("request_id", &self.request_id)
            .field("raw_uri", &self.raw_uri)
            .field("callback_url", &self.callback_url)
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}

impl WebContext {
    /// Takes over `exchange`. The response is pending until finalized.
    pub fn new(exchange: Exchange) -> Self {
        let (request, responder) = exchange.into_parts();
        Self {
            request_id: request.request_id().to_owned(),
            raw_uri: request.raw_uri().to_owned(),
            headers: request.headers().clone(),
            session: request.session().clone(),
            callback_url: None,
            responder,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            content: String::new(),
            finalized: None,
        }
    }

    /// Request identifier.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The raw request target.
    pub fn raw_request_uri(&self) -> &str {
        &self.raw_uri
    }

    /// First value of request header `name` (case-insensitive).
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First decoded value of query parameter `name`.
    pub fn request_parameter(&self, name: &str) -> Option<String> {
        let (_, query) = self.raw_uri.split_once('?')?;
        let query = query.split('#').next().unwrap_or_default();
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// The caller's session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Stores a value in the session for the callback leg of the flow.
    pub fn stash(&self, key: &str, value: impl Into<String>) {
        self.session.put(key, SessionValue::Text(value.into()));
    }

    /// Reads a value previously stored with [`stash`](Self::stash).
    pub fn fetch(&self, key: &str) -> Option<String> {
        match self.session.get(key)? {
            SessionValue::Text(value) => Some(value),
            SessionValue::Profile(_) => None,
        }
    }

    /// Callback URL computed for this request, if the client accepts one.
    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url.as_deref()
    }

    pub(crate) fn set_callback_url(&mut self, url: String) {
        self.callback_url = Some(url);
    }

    /// Sets the status of the buffered response.
    ///
    /// # Panics
    ///
    /// Panics if the response was already finalized.
    pub fn set_response_status(&mut self, status: StatusCode) {
        self.ensure_open("set_response_status");
        self.status = status;
    }

    /// Adds a header to the buffered response.
    ///
    /// # Panics
    ///
    /// Panics if the response was already finalized.
    pub fn set_response_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.ensure_open("set_response_header");
        self.response_headers.insert(name, value);
    }

    /// Appends to the buffered response body.
    ///
    /// # Panics
    ///
    /// Panics if the response was already finalized.
    pub fn write_response_content(&mut self, content: &str) {
        self.ensure_open("write_response_content");
        self.content.push_str(content);
    }

    /// Sends a `302 Found` redirect to `location` immediately.
    ///
    /// # Panics
    ///
    /// Panics if the response was already finalized.
    pub fn redirect(&mut self, location: &str) {
        self.ensure_open("redirect");
        tracing::debug!(
            request_id = %self.request_id,
            %location,
            "redirecting to identity provider"
        );
        self.responder.send_redirect(StatusCode::FOUND, location);
        self.finalized = Some(Finalization::Redirect);
    }

    /// Sends exactly the response the identity provider asked for.
    ///
    /// # Panics
    ///
    /// Panics if the response was already finalized.
    pub fn complete_with_challenge_response(&mut self, challenge: ChallengeResponse) {
        self.ensure_open("complete_with_challenge_response");
        tracing::debug!(
            request_id = %self.request_id,
            status = challenge.status().as_u16(),
            "sending challenge response"
        );
        self.responder.send_response(challenge.into_response());
        self.finalized = Some(Finalization::ChallengeResponse);
    }

    /// Sends the buffered response unless the client already finalized one.
    pub fn complete_empty(&mut self) {
        if let Some(previous) = self.finalized {
            tracing::trace!(request_id = %self.request_id, ?previous, "response already finalized");
            return;
        }
        let mut response = Response::new(std::mem::take(&mut self.content));
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.response_headers);
        self.responder.send_response(response);
        self.finalized = Some(Finalization::Completed);
    }

    /// How the response was finalized, if it was.
    pub fn finalization(&self) -> Option<Finalization> {
        self.finalized
    }

    /// Returns `true` once a response has been written.
    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    fn ensure_open(&self, operation: &str) {
        if let Some(previous) = self.finalized {
            panic!(
                "double finalization on request {}: {operation} called after {previous:?}",
                self.request_id
            );
        }
    }
}
