//! Identity provider client abstraction.
//!
//! Concrete providers (form login, bearer tokens, delegated SSO redirects, ...)
//! implement [`IdentityClient`]. They are chosen at configuration time; the
//! gate never inspects their concrete type. The only optional capability,
//! accepting a per-request callback URL, is exposed through
//! [`IdentityClient::dynamic_callback`].

use http::header::{InvalidHeaderValue, LOCATION, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use parking_lot::RwLock;

use crate::error::ChallengeError;
use crate::web::WebContext;

/// An identity provider client.
///
/// `initiate_challenge` runs on a blocking worker thread and may perform
/// network I/O against the provider. It drives the caller towards the
/// provider through `context`, typically by calling
/// [`WebContext::redirect`]. It may instead return
/// [`ChallengeError::RequiresHttpAction`] to have a specific response sent.
pub trait IdentityClient: Send + Sync {
    /// Short name used in logs and profiles.
    fn name(&self) -> &str;

    /// Starts the authentication challenge for the request behind `context`.
    ///
    /// # Errors
    ///
    /// [`ChallengeError::RequiresHttpAction`] when a specific HTTP response must be
    /// sent instead, [`ChallengeError::Technical`] for any other failure.
    fn initiate_challenge(
        &self,
        context: &mut WebContext,
        force_reauthenticate: bool,
        force_renewal: bool,
    ) -> Result<(), ChallengeError>;

    /// The callback capability, for clients whose callback URL depends on
    /// where the service is reached from.
    fn dynamic_callback(&self) -> Option<&dyn DynamicCallback> {
        None
    }
}

/// Capability of accepting a callback URL computed per request.
pub trait DynamicCallback: Send + Sync {
    /// Sets the URL the provider should call back on.
    fn set_callback_url(&self, url: &str);
}

/// Thread-safe holder for the last configured callback URL.
///
/// Clients embed this to implement [`DynamicCallback`]. Since requests may
/// race on it, clients should prefer [`WebContext::callback_url`] while
/// handling a challenge and use this value only as a fallback.
#[derive(Debug, Default)]
pub struct CallbackUrl {
    url: RwLock<Option<String>>,
}

impl CallbackUrl {
    /// Creates an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last configured URL.
    pub fn get(&self) -> Option<String> {
        self.url.read().clone()
    }
}

impl DynamicCallback for CallbackUrl {
    fn set_callback_url(&self, url: &str) {
        *self.url.write() = Some(url.to_owned());
    }
}

/// A response an identity provider wants sent in place of completing a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl ChallengeResponse {
    /// A response with `status` and nothing else.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }

    /// `302 Found` to `location`.
    ///
    /// # Errors
    ///
    /// Returns an error if `location` is not a valid header value.
    pub fn redirect(location: &str) -> Result<Self, InvalidHeaderValue> {
        Ok(Self::new(StatusCode::FOUND).with_header(LOCATION, HeaderValue::from_str(location)?))
    }

    /// `401 Unauthorized` with a `WWW-Authenticate` challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if `challenge` is not a valid header value.
    pub fn unauthorized(challenge: &str) -> Result<Self, InvalidHeaderValue> {
        Ok(Self::new(StatusCode::UNAUTHORIZED)
            .with_header(WWW_AUTHENTICATE, HeaderValue::from_str(challenge)?))
    }

    /// `403 Forbidden`.
    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN)
    }

    /// `200 OK` with a body, e.g. an auto-submitting form.
    pub fn ok_with_content(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK).with_body(body)
    }

    /// Adds a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Converts into an HTTP response.
    pub fn into_response(self) -> Response<String> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_sets_location() {
        let challenge = ChallengeResponse::redirect("https://idp.example.com/authorize").unwrap();
        assert_eq!(challenge.status(), StatusCode::FOUND);
        assert_eq!(
            challenge.headers().get(LOCATION).unwrap(),
            "https://idp.example.com/authorize"
        );
    }

    #[test]
    fn redirect_rejects_control_characters() {
        assert!(ChallengeResponse::redirect("https://x\n/").is_err());
    }

    #[test]
    fn unauthorized_carries_challenge_header() {
        let challenge = ChallengeResponse::unauthorized(r#"Basic realm="api""#).unwrap();
        assert_eq!(challenge.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            challenge.headers().get(WWW_AUTHENTICATE).unwrap(),
            r#"Basic realm="api""#
        );
    }

    #[test]
    fn into_response_keeps_status_headers_and_body() {
        let response = ChallengeResponse::ok_with_content("<form></form>")
            .with_header(http::header::CONTENT_TYPE, HeaderValue::from_static("text/html"))
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(http::header::CONTENT_TYPE);
        assert_eq!(content_type.unwrap(), "text/html");
        assert_eq!(response.body(), "<form></form>");
    }

    #[test]
    fn callback_url_holder_keeps_last_value() {
        let holder = CallbackUrl::new();
        assert!(holder.get().is_none());

        holder.set_callback_url("http://a/cb");
        holder.set_callback_url("http://b/cb");
        assert_eq!(holder.get().as_deref(), Some("http://b/cb"));
    }
}
