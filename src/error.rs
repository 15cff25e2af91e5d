use std::any::Any;
use std::error::Error as StdError;

use crate::client::ChallengeResponse;

/// Boxed cause carried by fatal failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised while resolving the public address of a request.
///
/// Only the *absence* of a hint lets resolution fall through to the next tier.
/// A hint that is present but unparseable aborts resolution with one of these.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    /// An explicit host/port hint (forwarded host or `Host`) failed to parse.
    #[error("malformed host specification in {header}: '{value}' ({reason})")]
    MalformedHostSpecification {
        /// Name of the header the hint came from
        header: &'static str,
        /// The offending value
        value: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// The raw request target is neither a path nor a usable absolute URI.
    #[error("malformed request target '{target}' ({reason})")]
    MalformedRequestTarget {
        /// The offending request target
        target: String,
        /// Why it was rejected
        reason: String,
    },

    /// A configured fixed public address is not an absolute origin.
    #[error("invalid configured public address '{value}' ({reason})")]
    InvalidConfiguredAddress {
        /// The configured value
        value: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

/// Failure reported by an identity provider client while initiating a challenge.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    /// The provider wants a specific HTTP response sent instead of failing.
    ///
    /// This is recoverable: the gate writes the response and the request is done.
    #[error("identity provider requires HTTP action (status {})", .0.status())]
    RequiresHttpAction(ChallengeResponse),

    /// Any other provider failure (network, misconfiguration). Fatal for the request.
    #[error("identity provider failure: {0}")]
    Technical(#[source] BoxError),
}

impl ChallengeError {
    /// Wraps an arbitrary error as a technical (fatal) failure.
    pub fn technical(err: impl Into<BoxError>) -> Self {
        ChallengeError::Technical(err.into())
    }
}

/// An identity client panicked before writing any response.
#[derive(Debug, thiserror::Error)]
#[error("identity client panicked: {message}")]
pub struct ClientPanic {
    message: String,
}

impl ClientPanic {
    /// Extracts the panic message from a caught payload.
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self { message }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors surfaced by the authentication gate to generic error handling.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Initiating authentication failed for a reason other than a challenge payload.
    #[error("failed to initiate authentication with client '{client}'")]
    AuthenticationInitiationFailed {
        /// Name of the identity client that was driven
        client: String,
        /// Original cause
        #[source]
        source: BoxError,
    },

    /// The public address needed for the callback URL could not be resolved.
    #[error(transparent)]
    Address(#[from] AddressError),
}
