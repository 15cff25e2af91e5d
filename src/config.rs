//! Configuration for the authentication gate.

use serde::Deserialize;

/// Gate configuration.
///
/// Deserializes from any serde format; every field has a default so an empty
/// document yields a working configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Path the identity provider calls back on, relative to the public address.
    pub callback_path: String,

    /// Scheme assumed when no request hint says otherwise.
    pub default_scheme: String,

    /// Fixed public origin (`scheme://host[:port]`). Disables address inference when set.
    pub public_address: Option<String>,

    /// Ask the provider to re-authenticate even if it holds a session of its own.
    pub force_reauthenticate: bool,

    /// Ask the provider to renew any credentials it already issued.
    pub force_renewal: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            callback_path: "auth-callback".to_owned(),
            default_scheme: "http".to_owned(),
            public_address: None,
            force_reauthenticate: false,
            force_renewal: false,
        }
    }
}

impl GateConfig {
    /// Returns the callback path with any leading slashes removed.
    pub fn trimmed_callback_path(&self) -> &str {
        self.callback_path.trim_start_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: GateConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, GateConfig::default());
        assert_eq!(cfg.callback_path, "auth-callback");
        assert_eq!(cfg.default_scheme, "http");
        assert!(cfg.public_address.is_none());
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let cfg: GateConfig =
            serde_json::from_str(r#"{"default_scheme": "https", "force_renewal": true}"#).unwrap();
        assert_eq!(cfg.default_scheme, "https");
        assert!(cfg.force_renewal);
        assert!(!cfg.force_reauthenticate);
        assert_eq!(cfg.callback_path, "auth-callback");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<GateConfig, _> = serde_json::from_str(r#"{"callbackPath": "cb"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn callback_path_leading_slashes_are_trimmed() {
        let cfg = GateConfig {
            callback_path: "//login/callback".to_owned(),
            ..GateConfig::default()
        };
        assert_eq!(cfg.trimmed_callback_path(), "login/callback");
    }
}
