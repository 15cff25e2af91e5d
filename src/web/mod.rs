//! Bridge between an in-flight request and an identity provider client.
//!
//! A [`WebContext`] wraps one request/response pair while a challenge is
//! initiated. It is the only surface identity clients see: they read request
//! data, stash values in the session, and finalize the response.
//!
//! # Finalization
//!
//! Exactly one of [`WebContext::redirect`],
//! [`WebContext::complete_with_challenge_response`] or
//! [`WebContext::complete_empty`] writes the response. The context records
//! which one did and panics on any later write attempt; `complete_empty` is
//! the exception and becomes a no-op once the response is written.

mod context;

pub use context::{Finalization, WebContext};
