use std::collections::BTreeMap;

/// An authenticated identity established by an identity provider.
///
/// The record is opaque to the gate: it is created by an identity client when
/// a challenge completes, stored in the session, and handed to the
/// authorization policy and downstream handlers unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    /// Provider-scoped unique identifier
    pub id: String,
    /// Name of the identity client that established the profile
    pub client_name: String,
    /// Roles granted by the provider
    pub roles: Vec<String>,
    /// Provider-defined attributes (e.g. email, display name)
    pub attributes: BTreeMap<String, String>,
}

impl IdentityProfile {
    /// Creates a profile with no roles and no attributes.
    pub fn new(id: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_name: client_name.into(),
            roles: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the provider granted `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns an attribute value.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Provider-qualified identifier, `client_name#id`.
    pub fn typed_id(&self) -> String {
        format!("{}#{}", self.client_name, self.id)
    }
}
