use http::StatusCode;

use crate::profile::IdentityProfile;
use crate::request::{Exchange, Request};

/// What happens to an exchange after a gate stage.
#[derive(Debug)]
pub enum Flow {
    /// Continue with the next handler; the exchange is unanswered
    Next(Exchange),
    /// A response was written or is being written; nothing further to do
    Handled,
}

impl Flow {
    /// Returns the exchange if processing should continue downstream.
    pub fn into_next(self) -> Option<Exchange> {
        match self {
            Flow::Next(exchange) => Some(exchange),
            Flow::Handled => None,
        }
    }
}

/// Pluggable authorization logic applied by the gate.
pub trait AuthorizationPolicy: Send + Sync {
    /// Whether `request` must carry an authenticated identity.
    fn is_authentication_required(&self, request: &Request) -> bool;

    /// Decides what to do with a request whose caller is authenticated as `profile`.
    ///
    /// The default lets every authenticated caller through.
    fn handle_authorization(&self, exchange: Exchange, profile: &IdentityProfile) -> Flow {
        let _ = profile;
        Flow::Next(exchange)
    }
}

/// Requires authentication everywhere and admits every authenticated caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticateAll;

impl AuthorizationPolicy for AuthenticateAll {
    fn is_authentication_required(&self, _request: &Request) -> bool {
        true
    }
}

/// Never requires authentication; profiles are still attached when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl AuthorizationPolicy for Anonymous {
    fn is_authentication_required(&self, _request: &Request) -> bool {
        false
    }
}

/// Protects path prefixes, with public exemptions and an optional role.
///
/// Prefixes match whole segments: `/admin` covers `/admin` and `/admin/users`
/// but not `/administrator`. Public prefixes win over protected ones.
///
/// ```
/// use auth_gate::ProtectedPaths;
///
/// let policy = ProtectedPaths::new()
///     .protect("/admin")
///     .allow("/admin/health")
///     .require_role("admin");
/// assert!(policy.covers("/admin/users"));
/// assert!(!policy.covers("/admin/health"));
/// assert!(!policy.covers("/administrator"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProtectedPaths {
    protected: Vec<String>,
    public: Vec<String>,
    required_role: Option<String>,
}

impl ProtectedPaths {
    /// Creates a policy protecting nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a protected prefix.
    pub fn protect(mut self, prefix: impl Into<String>) -> Self {
        self.protected.push(normalize(prefix.into()));
        self
    }

    /// Adds a public prefix exempt from protection.
    pub fn allow(mut self, prefix: impl Into<String>) -> Self {
        self.public.push(normalize(prefix.into()));
        self
    }

    /// Requires authenticated callers to hold `role`; others get `403`.
    pub fn require_role(mut self, role: impl Into<String>) -> Self {
        self.required_role = Some(role.into());
        self
    }

    /// Whether `path` requires authentication under this policy.
    pub fn covers(&self, path: &str) -> bool {
        let matches = |prefix: &String| segment_prefix(prefix, path);
        self.protected.iter().any(matches) && !self.public.iter().any(matches)
    }
}

impl AuthorizationPolicy for ProtectedPaths {
    fn is_authentication_required(&self, request: &Request) -> bool {
        self.covers(request.path())
    }

    fn handle_authorization(&self, exchange: Exchange, profile: &IdentityProfile) -> Flow {
        let path = exchange.request().path();
        match &self.required_role {
            Some(role) if self.covers(path) && !profile.has_role(role) => {
                tracing::info!(
                    request_id = %exchange.request().request_id(),
                    profile = %profile.typed_id(),
                    %role,
                    "authorization denied"
                );
                exchange.respond_status(StatusCode::FORBIDDEN);
                Flow::Handled
            }
            _ => Flow::Next(exchange),
        }
    }
}

fn normalize(prefix: String) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

fn segment_prefix(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySessionStore, RecordingResponder};

    fn exchange(path: &str) -> (Exchange, RecordingResponder) {
        let responder = RecordingResponder::new();
        let request = Request::new(
            "req-p",
            path,
            "127.0.0.1:80".parse().unwrap(),
            MemorySessionStore::shared().session("s"),
        );
        (Exchange::new(request, Box::new(responder.clone())), responder)
    }

    #[test]
    fn authenticate_all_requires_and_admits() {
        let (ex, responder) = exchange("/anything");
        assert!(AuthenticateAll.is_authentication_required(ex.request()));

        let flow = AuthenticateAll.handle_authorization(ex, &IdentityProfile::new("a", "c"));
        assert!(flow.into_next().is_some());
        assert_eq!(responder.count(), 0);
    }

    #[test]
    fn anonymous_never_requires() {
        let (ex, _) = exchange("/admin");
        assert!(!Anonymous.is_authentication_required(ex.request()));
    }

    #[test]
    fn protected_paths_match_whole_segments() {
        let policy = ProtectedPaths::new().protect("admin/");
        assert!(policy.covers("/admin"));
        assert!(policy.covers("/admin/"));
        assert!(policy.covers("/admin/users"));
        assert!(!policy.covers("/administrator"));
        assert!(!policy.covers("/"));
    }

    #[test]
    fn root_prefix_covers_everything_except_public() {
        let policy = ProtectedPaths::new().protect("/").allow("/public");
        assert!(policy.covers("/app"));
        assert!(!policy.covers("/public/logo.png"));
    }

    #[test]
    fn missing_role_is_forbidden() {
        let policy = ProtectedPaths::new()
            .protect("/admin")
            .require_role("admin");
        let (ex, responder) = exchange("/admin/users?page=2");

        let flow = policy.handle_authorization(ex, &IdentityProfile::new("bob", "oidc"));

        assert!(matches!(flow, Flow::Handled));
        assert_eq!(responder.single().status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn role_holder_proceeds() {
        let policy = ProtectedPaths::new()
            .protect("/admin")
            .require_role("admin");
        let (ex, responder) = exchange("/admin/users");

        let profile = IdentityProfile::new("alice", "oidc").with_role("admin");
        let flow = policy.handle_authorization(ex, &profile);
        assert!(flow.into_next().is_some());
        assert_eq!(responder.count(), 0);
    }

    #[test]
    fn role_not_checked_outside_protected_paths() {
        let policy = ProtectedPaths::new()
            .protect("/admin")
            .require_role("admin");
        let (ex, _) = exchange("/home");
        let flow = policy.handle_authorization(ex, &IdentityProfile::new("bob", "oidc"));
        assert!(flow.into_next().is_some());
    }
}
