//! Test doubles for the gate's collaborators.
//!
//! - [`MemorySessionStore`]: session store with one mutex per session entry
//! - [`RecordingResponder`]: responder that records everything sent
//! - [`ScriptedClient`]: identity client that follows a fixed [`Script`]
//!
//! These are not production backends; they exist so embedding code and this
//! crate's own tests can drive the gate without a server or a real provider.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use auth_gate::testing::{MemorySessionStore, RecordingResponder, Script, ScriptedClient};
//! use auth_gate::{AuthenticateAll, AuthenticationGate, Exchange, Flow, Request};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let client = Arc::new(ScriptedClient::new("sso", Script::Redirect("https://idp/login".into())));
//! let gate = AuthenticationGate::builder(client, Arc::new(AuthenticateAll)).build().unwrap();
//!
//! let store = MemorySessionStore::shared();
//! let responder = RecordingResponder::new();
//! let local = "127.0.0.1:8080".parse().unwrap();
//! let request = Request::new("r1", "/private", local, store.session("s1"));
//!
//! let flow = gate.handle(Exchange::new(request, Box::new(responder.clone()))).await.unwrap();
//! assert!(matches!(flow, Flow::Handled));
//! assert_eq!(responder.single().location().as_deref(), Some("https://idp/login"));
//! # });
//! ```

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::header::LOCATION;
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use parking_lot::{Mutex, RwLock};

use crate::client::{CallbackUrl, ChallengeResponse, DynamicCallback, IdentityClient};
use crate::error::ChallengeError;
use crate::request::Responder;
use crate::session::{Session, SessionStore, SessionValue};
use crate::web::WebContext;

type Entry = Arc<Mutex<HashMap<String, SessionValue>>>;

/// In-memory session store.
///
/// The outer map only locates entries; each session's values sit behind
/// their own mutex so unrelated sessions never contend.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store behind an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns a handle to session `id`.
    pub fn session(self: &Arc<Self>, id: &str) -> Session {
        Session::new(id, Arc::clone(self) as Arc<dyn SessionStore>)
    }

    /// Number of values held for session `id`.
    pub fn len(&self, id: &str) -> usize {
        self.entry(id).map_or(0, |entry| entry.lock().len())
    }

    fn entry(&self, id: &str) -> Option<Entry> {
        self.sessions.read().get(id).cloned()
    }

    fn entry_or_insert(&self, id: &str) -> Entry {
        if let Some(entry) = self.entry(id) {
            return entry;
        }
        Arc::clone(self.sessions.write().entry(id.to_owned()).or_default())
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, session_id: &str, key: &str) -> Option<SessionValue> {
        self.entry(session_id)?.lock().get(key).cloned()
    }

    fn put(&self, session_id: &str, key: &str, value: SessionValue) {
        self.entry_or_insert(session_id)
            .lock()
            .insert(key.to_owned(), value);
    }

    fn remove(&self, session_id: &str, key: &str) -> Option<SessionValue> {
        self.entry(session_id)?.lock().remove(key)
    }
}

/// A response captured by [`RecordingResponder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentResponse {
    /// Status code
    pub status: StatusCode,
    /// Headers (a redirect carries `Location`)
    pub headers: HeaderMap,
    /// Body
    pub body: String,
}

impl SentResponse {
    /// The `Location` header, if any.
    pub fn location(&self) -> Option<String> {
        self.headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }
}

/// Responder that records every response. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingResponder {
    sent: Arc<Mutex<Vec<SentResponse>>>,
}

impl RecordingResponder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<SentResponse> {
        self.sent.lock().clone()
    }

    /// Number of responses sent.
    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    /// The one response sent.
    ///
    /// # Panics
    ///
    /// Panics unless exactly one response was sent.
    pub fn single(&self) -> SentResponse {
        let sent = self.sent.lock();
        assert_eq!(sent.len(), 1, "expected exactly one response, got {sent:?}");
        sent[0].clone()
    }
}

impl Responder for RecordingResponder {
    fn send_redirect(&mut self, status: StatusCode, location: &str) {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(location) {
            headers.insert(LOCATION, value);
        }
        self.sent.lock().push(SentResponse {
            status,
            headers,
            body: String::new(),
        });
    }

    fn send_response(&mut self, response: Response<String>) {
        let (parts, body) = response.into_parts();
        self.sent.lock().push(SentResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        });
    }
}

/// What a [`ScriptedClient`] does when asked to initiate a challenge.
#[derive(Debug, Clone)]
pub enum Script {
    /// Redirect through the context to this location
    Redirect(String),
    /// Redirect to the per-request callback URL (or `/` if none)
    RedirectToCallback,
    /// Fail with a challenge payload
    Challenge(ChallengeResponse),
    /// Fail with a technical error carrying this message
    Fail(String),
    /// Buffer a status and body without finalizing
    Write(StatusCode, String),
    /// Return without touching the context
    Nothing,
    /// Panic inside the challenge call
    Panic,
    /// Redirect to the first location, then to the second (a client bug)
    RedirectTwice(String, String),
    /// Redirect, then also fail with a challenge payload (a client bug)
    RedirectThenChallenge(String, ChallengeResponse),
}

/// Identity client following a fixed script, recording each call.
#[derive(Debug)]
pub struct ScriptedClient {
    name: String,
    script: Script,
    dynamic: bool,
    delay: Option<Duration>,
    callback: CallbackUrl,
    calls: AtomicUsize,
    observed: Mutex<Vec<ObservedCall>>,
}

/// Arguments seen by one [`ScriptedClient`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedCall {
    /// Raw URI of the request being challenged
    pub raw_uri: String,
    /// Callback URL on the context, if any
    pub callback_url: Option<String>,
    /// `force_reauthenticate` flag
    pub force_reauthenticate: bool,
    /// `force_renewal` flag
    pub force_renewal: bool,
}

impl ScriptedClient {
    /// Creates a client without the dynamic callback capability.
    pub fn new(name: impl Into<String>, script: Script) -> Self {
        Self {
            name: name.into(),
            script,
            dynamic: false,
            delay: None,
            callback: CallbackUrl::new(),
            calls: AtomicUsize::new(0),
            observed: Mutex::new(Vec::new()),
        }
    }

    /// Enables the dynamic callback capability.
    pub fn with_dynamic_callback(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Blocks the worker thread for `delay` before following the script.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of challenge calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Arguments of every call.
    pub fn observed(&self) -> Vec<ObservedCall> {
        self.observed.lock().clone()
    }

    /// Last callback URL configured through the capability.
    pub fn configured_callback(&self) -> Option<String> {
        self.callback.get()
    }
}

impl IdentityClient for ScriptedClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn initiate_challenge(
        &self,
        context: &mut WebContext,
        force_reauthenticate: bool,
        force_renewal: bool,
    ) -> Result<(), ChallengeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.observed.lock().push(ObservedCall {
            raw_uri: context.raw_request_uri().to_owned(),
            callback_url: context.callback_url().map(str::to_owned),
            force_reauthenticate,
            force_renewal,
        });
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        match &self.script {
            Script::Redirect(location) => {
                context.redirect(location);
                Ok(())
            }
            Script::RedirectToCallback => {
                let location = context.callback_url().unwrap_or("/").to_owned();
                context.redirect(&location);
                Ok(())
            }
            Script::Challenge(challenge) => {
                Err(ChallengeError::RequiresHttpAction(challenge.clone()))
            }
            Script::Fail(message) => {
                Err(ChallengeError::technical(io::Error::other(message.clone())))
            }
            Script::Write(status, body) => {
                context.set_response_status(*status);
                context.write_response_content(body);
                Ok(())
            }
            Script::Nothing => Ok(()),
            Script::Panic => panic!("scripted identity client panicked"),
            Script::RedirectTwice(first, second) => {
                context.redirect(first);
                context.redirect(second);
                Ok(())
            }
            Script::RedirectThenChallenge(location, challenge) => {
                context.redirect(location);
                Err(ChallengeError::RequiresHttpAction(challenge.clone()))
            }
        }
    }

    fn dynamic_callback(&self) -> Option<&dyn DynamicCallback> {
        if self.dynamic {
            Some(&self.callback)
        } else {
            None
        }
    }
}
