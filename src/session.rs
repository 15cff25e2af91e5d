//! Per-session access to the identity profile and the saved target URI.
//!
//! The storage backend is a collaborator ([`SessionStore`]). The gate never
//! reaches it through ambient state: each [`Request`](crate::Request) carries
//! an explicit [`Session`] handle.

use std::fmt;
use std::sync::Arc;

use crate::profile::IdentityProfile;

/// Session key holding the URI the caller requested before authentication.
pub const SAVED_URI_KEY: &str = "auth.saved_uri";
/// Session key holding the authenticated [`IdentityProfile`].
pub const USER_PROFILE_KEY: &str = "auth.user_profile";

/// A value held in the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValue {
    /// Plain text (saved URIs, provider state)
    Text(String),
    /// An authenticated identity
    Profile(IdentityProfile),
}

/// Key/value storage keyed by session id.
///
/// Writes are last-write-wins per key; no atomicity across keys is required.
/// Implementations must serialize concurrent mutation of the same session
/// entry (typically with a mutex per entry).
pub trait SessionStore: Send + Sync {
    /// Reads `key` from session `session_id`.
    fn get(&self, session_id: &str, key: &str) -> Option<SessionValue>;

    /// Writes `key` in session `session_id`, replacing any previous value.
    fn put(&self, session_id: &str, key: &str, value: SessionValue);

    /// Removes `key` from session `session_id`, returning the previous value.
    fn remove(&self, session_id: &str, key: &str) -> Option<SessionValue>;
}

/// Handle to one caller's session.
///
/// Cheap to clone; clones address the same underlying session.
#[derive(Clone)]
pub struct Session {
    id: String,
    store: Arc<dyn SessionStore>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a handle for session `id` backed by `store`.
    pub fn new(id: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            id: id.into(),
            store,
        }
    }

    /// The session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reads a raw value.
    pub fn get(&self, key: &str) -> Option<SessionValue> {
        self.store.get(&self.id, key)
    }

    /// Writes a raw value.
    pub fn put(&self, key: &str, value: SessionValue) {
        self.store.put(&self.id, key, value);
    }

    /// Removes a raw value.
    pub fn remove(&self, key: &str) -> Option<SessionValue> {
        self.store.remove(&self.id, key)
    }

    /// The authenticated profile, if any.
    ///
    /// A value of the wrong kind under the profile key is treated as absent.
    pub fn profile(&self) -> Option<IdentityProfile> {
        match self.get(USER_PROFILE_KEY)? {
            SessionValue::Profile(profile) => Some(profile),
            SessionValue::Text(_) => {
                tracing::warn!(
                    session_id = %self.id,
                    "ignoring non-profile value under profile key"
                );
                None
            }
        }
    }

    /// Stores the authenticated profile.
    pub fn set_profile(&self, profile: IdentityProfile) {
        self.put(USER_PROFILE_KEY, SessionValue::Profile(profile));
    }

    /// Removes the authenticated profile (logout).
    pub fn clear_profile(&self) -> Option<IdentityProfile> {
        match self.remove(USER_PROFILE_KEY)? {
            SessionValue::Profile(profile) => Some(profile),
            SessionValue::Text(_) => None,
        }
    }

    /// The URI saved before redirecting to the identity provider.
    pub fn saved_uri(&self) -> Option<String> {
        match self.get(SAVED_URI_KEY)? {
            SessionValue::Text(uri) => Some(uri),
            SessionValue::Profile(_) => None,
        }
    }

    /// Saves the URI to return to after authentication.
    pub fn save_uri(&self, uri: impl Into<String>) {
        self.put(SAVED_URI_KEY, SessionValue::Text(uri.into()));
    }

    /// Reads and clears the saved URI in one store operation.
    ///
    /// Intended for the post-authentication callback so a saved URI never
    /// outlives one login round trip.
    pub fn take_saved_uri(&self) -> Option<String> {
        match self.remove(SAVED_URI_KEY)? {
            SessionValue::Text(uri) => Some(uri),
            SessionValue::Profile(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapStore {
        entries: Mutex<HashMap<(String, String), SessionValue>>,
    }

    impl SessionStore for MapStore {
        fn get(&self, session_id: &str, key: &str) -> Option<SessionValue> {
            self.entries
                .lock()
                .get(&(session_id.to_owned(), key.to_owned()))
                .cloned()
        }

        fn put(&self, session_id: &str, key: &str, value: SessionValue) {
            self.entries
                .lock()
                .insert((session_id.to_owned(), key.to_owned()), value);
        }

        fn remove(&self, session_id: &str, key: &str) -> Option<SessionValue> {
            self.entries
                .lock()
                .remove(&(session_id.to_owned(), key.to_owned()))
        }
    }

    fn session(id: &str, store: &Arc<MapStore>) -> Session {
        Session::new(id, Arc::clone(store) as Arc<dyn SessionStore>)
    }

    #[test]
    fn profile_round_trips_through_store() {
        let store = Arc::new(MapStore::default());
        let s = session("s1", &store);

        assert!(s.profile().is_none());
        s.set_profile(IdentityProfile::new("alice", "form"));
        assert_eq!(s.profile().unwrap().id, "alice");
    }

    #[test]
    fn sessions_are_isolated_by_id() {
        let store = Arc::new(MapStore::default());
        session("s1", &store).save_uri("/private");

        let saved = session("s1", &store).saved_uri();
        assert_eq!(saved.as_deref(), Some("/private"));
        assert!(session("s2", &store).saved_uri().is_none());
    }

    #[test]
    fn take_saved_uri_consumes_value() {
        let store = Arc::new(MapStore::default());
        let s = session("s1", &store);
        s.save_uri("/reports?year=2024");

        assert_eq!(s.take_saved_uri().as_deref(), Some("/reports?year=2024"));
        assert!(s.take_saved_uri().is_none());
        assert!(s.saved_uri().is_none());
    }

    #[test]
    fn wrong_kind_under_profile_key_is_absent() {
        let store = Arc::new(MapStore::default());
        let s = session("s1", &store);
        s.put(USER_PROFILE_KEY, SessionValue::Text("not a profile".to_owned()));

        assert!(s.profile().is_none());
    }

    #[test]
    fn clear_profile_returns_previous() {
        let store = Arc::new(MapStore::default());
        let s = session("s1", &store);
        s.set_profile(IdentityProfile::new("bob", "oidc"));

        assert_eq!(s.clear_profile().unwrap().id, "bob");
        assert!(s.profile().is_none());
    }

    #[test]
    fn debug_does_not_require_store_debug() {
        let store = Arc::new(MapStore::default());
        let out = format!("{:?}", session("abc", &store));
        assert!(out.contains("abc"));
    }
}
