//! Tracing setup for binaries and tests that embed the gate.
//!
//! The gate itself only emits `tracing` events; installing a subscriber is
//! the embedder's choice. Every event inside [`AuthenticationGate::handle`]
//! runs under an `auth_gate` span carrying `request_id` and `client`.
//!
//! | level | events |
//! |-------|--------|
//! | `error` | initiation failures surfaced as [`GateError`] |
//! | `warn`  | challenge payloads, unresolvable public address, corrupt session values |
//! | `info`  | challenge initiation (with `callback_url`), authorization denials |
//! | `debug` | per-request decision, redirects, finalization |
//! | `trace` | address resolution tiers |
//!
//! [`AuthenticationGate::handle`]: crate::AuthenticationGate::handle
//! [`GateError`]: crate::GateError

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "auth_gate=info";

/// Builds the filter from `RUST_LOG`, falling back to `fallback`.
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Installs a formatting subscriber filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed, which makes
/// it safe to call from every test.
pub fn init_tracing() -> bool {
    fmt()
        .with_env_filter(env_filter(DEFAULT_DIRECTIVE))
        .with_target(false)
        .try_init()
        .is_ok()
}
