use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::Instrument;

use crate::{
    address::{FixedPublicAddress, InferringPublicAddress, PublicAddressSource},
    client::IdentityClient,
    config::GateConfig,
    error::{AddressError, ChallengeError, ClientPanic, GateError},
    policy::{AuthorizationPolicy, Flow},
    profile::IdentityProfile,
    request::{Exchange, Request},
    web::WebContext,
};

/// Outcome of the gate's first look at a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationDecision {
    /// No profile and none required: continue untouched
    PassThrough,
    /// A profile exists: attach it and consult the policy
    Authorize(IdentityProfile),
    /// No profile but one is required: start a challenge
    InitiateAuthentication,
}

impl AuthenticationDecision {
    /// Combines the policy's requirement with the session's profile.
    ///
    /// An existing profile always wins, whether or not authentication is required.
    pub fn decide(authentication_required: bool, profile: Option<IdentityProfile>) -> Self {
        match (profile, authentication_required) {
            (Some(profile), _) => AuthenticationDecision::Authorize(profile),
            (None, true) => AuthenticationDecision::InitiateAuthentication,
            (None, false) => AuthenticationDecision::PassThrough,
        }
    }

    /// Short name used in log events.
    pub fn name(&self) -> &'static str {
        match self {
            AuthenticationDecision::PassThrough => "pass_through",
            AuthenticationDecision::Authorize(_) => "authorize",
            AuthenticationDecision::InitiateAuthentication => "initiate_authentication",
        }
    }
}

/// The authentication gate.
///
/// Sits in front of protected handlers. For each request it either lets the
/// request through, attaches the session's identity and defers to the
/// [`AuthorizationPolicy`], or drives the [`IdentityClient`] to challenge the
/// caller. The challenge runs on the blocking pool so the request task never
/// waits on the identity provider.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use auth_gate::testing::{Script, ScriptedClient};
/// use auth_gate::{AuthenticationGate, GateConfig, ProtectedPaths};
///
/// let client = Arc::new(ScriptedClient::new("oidc", Script::Nothing));
/// let gate = AuthenticationGate::builder(client, Arc::new(ProtectedPaths::new().protect("/app")))
///     .config(GateConfig {
///         public_address: Some("https://app.example.com".to_owned()),
///         ..GateConfig::default()
///     })
///     .build()
///     .expect("valid configuration");
/// assert_eq!(gate.client_name(), "oidc");
/// ```
pub struct AuthenticationGate {
    client: Arc<dyn IdentityClient>,
    policy: Arc<dyn AuthorizationPolicy>,
    address: Arc<dyn PublicAddressSource>,
    callback_path: String,
    force_reauthenticate: bool,
    force_renewal: bool,
    runtime: Option<Handle>,
}

impl std::fmt::Debug for AuthenticationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGate")
            .field("client", &self.client.name())
            .field("callback_path", &self.callback_path)
            .field("force_reauthenticate", &self.force_reauthenticate)
            .field("force_renewal", &self.force_renewal)
            .finish_non_exhaustive()
    }
}

impl AuthenticationGate {
    /// Starts building a gate for `client` under `policy`.
    pub fn builder(
        client: Arc<dyn IdentityClient>,
        policy: Arc<dyn AuthorizationPolicy>,
    ) -> AuthenticationGateBuilder {
        AuthenticationGateBuilder {
            client,
            policy,
            config: GateConfig::default(),
            address: None,
            runtime: None,
        }
    }

    /// Name of the identity client this gate drives.
    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// Decides what to do with `request` without acting on it.
    pub fn decide(&self, request: &Request) -> AuthenticationDecision {
        let profile = request.session().profile();
        let required = self.policy.is_authentication_required(request);
        AuthenticationDecision::decide(required, profile)
    }

    /// Runs the gate for one exchange.
    ///
    /// Returns [`Flow::Next`] with the exchange when downstream handlers
    /// should run, or [`Flow::Handled`] once a response has been written.
    ///
    /// # Errors
    ///
    /// - [`GateError::Address`] if the callback URL needs the public address
    ///   and the request's hints are malformed.
    /// - [`GateError::AuthenticationInitiationFailed`] if the identity client
    ///   fails, or panics, before writing a response. No response has been
    ///   written; the caller's error handling owns the reply.
    ///
    /// # Panics
    ///
    /// Panics with a double finalization message if the identity client
    /// writes the response twice, or writes it and then also reports a
    /// challenge payload. The first response has already been sent.
    pub async fn handle(&self, exchange: Exchange) -> Result<Flow, GateError> {
        let span = tracing::info_span!(
            "auth_gate",
            request_id = %exchange.request().request_id(),
            client = %self.client.name()
        );
        self.run(exchange).instrument(span).await
    }

    async fn run(&self, mut exchange: Exchange) -> Result<Flow, GateError> {
        let decision = self.decide(exchange.request());
        tracing::debug!(
            decision = decision.name(),
            path = %exchange.request().path(),
            "authentication decision"
        );

        match decision {
            AuthenticationDecision::PassThrough => Ok(Flow::Next(exchange)),
            AuthenticationDecision::Authorize(profile) => {
                exchange.request_mut().attach_profile(profile.clone());
                Ok(self.policy.handle_authorization(exchange, &profile))
            }
            AuthenticationDecision::InitiateAuthentication => self.initiate(exchange).await,
        }
    }

    async fn initiate(&self, exchange: Exchange) -> Result<Flow, GateError> {
        let request = exchange.request();
        request.session().save_uri(request.raw_uri());

        let callback_url = match self.client.dynamic_callback() {
            Some(callback) => {
                let url = self
                    .address
                    .public_address(request)
                    .inspect_err(|err| {
                        tracing::warn!(error = %err, "cannot resolve public address")
                    })?
                    .join(&self.callback_path);
                callback.set_callback_url(&url);
                Some(url)
            }
            None => None,
        };
        tracing::info!(
            callback_url = callback_url.as_deref().unwrap_or("-"),
            "initiating authentication"
        );

        let mut context = WebContext::new(exchange);
        if let Some(url) = callback_url {
            context.set_callback_url(url);
        }

        let client = Arc::clone(&self.client);
        let (force_reauthenticate, force_renewal) =
            (self.force_reauthenticate, self.force_renewal);
        let challenge = move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                client.initiate_challenge(&mut context, force_reauthenticate, force_renewal)
            }));
            match outcome {
                Ok(result) => (context, result),
                // A response already went out: the client broke the single-write contract.
                Err(payload) if context.is_finalized() => panic::resume_unwind(payload),
                Err(payload) => {
                    let cause = ClientPanic::from_payload(payload.as_ref());
                    (context, Err(ChallengeError::technical(cause)))
                }
            }
        };
        let task = match &self.runtime {
            Some(runtime) => runtime.spawn_blocking(challenge),
            None => tokio::task::spawn_blocking(challenge),
        };

        match task.await {
            Ok((mut context, Ok(()))) => {
                context.complete_empty();
                tracing::debug!(finalization = ?context.finalization(), "challenge initiated");
                Ok(Flow::Handled)
            }
            Ok((mut context, Err(ChallengeError::RequiresHttpAction(response)))) => {
                tracing::warn!(
                    status = response.status().as_u16(),
                    "identity provider requires http action"
                );
                context.complete_with_challenge_response(response);
                Ok(Flow::Handled)
            }
            Ok((_, Err(ChallengeError::Technical(source)))) => Err(self.initiation_failed(source)),
            Err(join_error) if join_error.is_panic() => {
                tracing::error!("identity client finalized the response twice");
                panic::resume_unwind(join_error.into_panic())
            }
            Err(join_error) => Err(self.initiation_failed(Box::new(join_error))),
        }
    }

    fn initiation_failed(&self, source: crate::error::BoxError) -> GateError {
        tracing::error!(error = %source, "authentication initiation failed");
        GateError::AuthenticationInitiationFailed {
            client: self.client.name().to_owned(),
            source,
        }
    }
}

/// Builder for [`AuthenticationGate`].
pub struct AuthenticationGateBuilder {
    client: Arc<dyn IdentityClient>,
    policy: Arc<dyn AuthorizationPolicy>,
    config: GateConfig,
    address: Option<Arc<dyn PublicAddressSource>>,
    runtime: Option<Handle>,
}

impl AuthenticationGateBuilder {
    /// Replaces the configuration.
    pub fn config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `source` for the public address, overriding the configuration.
    pub fn public_address_source(mut self, source: Arc<dyn PublicAddressSource>) -> Self {
        self.address = Some(source);
        self
    }

    /// Runs challenges on `runtime`'s blocking pool instead of the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the gate.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::InvalidConfiguredAddress`] if the configured
    /// public address is not an absolute origin.
    pub fn build(self) -> Result<AuthenticationGate, AddressError> {
        let address: Arc<dyn PublicAddressSource> =
            match (self.address, &self.config.public_address) {
                (Some(source), _) => source,
                (None, Some(fixed)) => Arc::new(FixedPublicAddress::parse(fixed)?),
                (None, None) => Arc::new(InferringPublicAddress::new(
                    self.config.default_scheme.clone(),
                )),
            };

        Ok(AuthenticationGate {
            client: self.client,
            policy: self.policy,
            address,
            callback_path: self.config.trimmed_callback_path().to_owned(),
            force_reauthenticate: self.config.force_reauthenticate,
            force_renewal: self.config.force_renewal,
            runtime: self.runtime,
        })
    }
}
