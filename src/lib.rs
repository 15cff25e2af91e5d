//! Non-blocking authentication gate with proxy-aware public address resolution.
//!
//! This crate puts an identity-provider challenge in front of protected
//! request handlers without ever blocking the request task:
//! - **Gate**: decides per request whether to pass through, authorize an
//!   existing identity, or initiate authentication
//! - **Public address**: infers the externally visible origin from proxy
//!   headers, the request target, `Host`, or the local socket
//! - **Web context**: the per-request surface an identity client drives to
//!   redirect, challenge, or write a response exactly once
//! - **Session profile**: typed access to the identity and the saved target URI
//!
//! # Core Types
//!
//! - [`AuthenticationGate`]: the gate, built with [`AuthenticationGate::builder`]
//! - [`IdentityClient`]: the identity provider client the gate drives
//! - [`AuthorizationPolicy`]: decides who needs authentication and who may proceed
//! - [`PublicAddressSource`]: where callback URLs get their origin
//! - [`WebContext`]: request/response bridge handed to identity clients
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use auth_gate::testing::{MemorySessionStore, RecordingResponder, Script, ScriptedClient};
//! use auth_gate::{AuthenticationGate, Exchange, IdentityProfile, ProtectedPaths, Request};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let client = Arc::new(ScriptedClient::new("oidc", Script::RedirectToCallback));
//! let policy = Arc::new(ProtectedPaths::new().protect("/app"));
//! let gate = AuthenticationGate::builder(client, policy).build().unwrap();
//!
//! let store = MemorySessionStore::shared();
//! store.session("s1").set_profile(IdentityProfile::new("alice", "oidc"));
//!
//! let local = "127.0.0.1:8080".parse().unwrap();
//! let request = Request::new("req-1", "/app/home", local, store.session("s1"));
//! let exchange = Exchange::new(request, Box::new(RecordingResponder::new()));
//!
//! let next = gate.handle(exchange).await.unwrap().into_next().expect("authenticated");
//! assert_eq!(next.request().profile().unwrap().id, "alice");
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
mod client;
mod config;
mod error;
mod gate;
pub mod logging;
mod policy;
mod profile;
mod request;
mod session;
pub mod testing;
mod web;

pub use address::{FixedPublicAddress, InferringPublicAddress, PublicAddress, PublicAddressSource};
pub use client::{CallbackUrl, ChallengeResponse, DynamicCallback, IdentityClient};
pub use config::GateConfig;
pub use error::{AddressError, BoxError, ChallengeError, ClientPanic, GateError};
pub use gate::{AuthenticationDecision, AuthenticationGate, AuthenticationGateBuilder};
pub use policy::{Anonymous, AuthenticateAll, AuthorizationPolicy, Flow, ProtectedPaths};
pub use profile::IdentityProfile;
pub use request::{Exchange, Request, Responder};
pub use session::{Session, SessionStore, SessionValue, SAVED_URI_KEY, USER_PROFILE_KEY};
pub use web::{Finalization, WebContext};
