//! Error types for PoP operations

use thiserror::Error;

/// Errors raised while parsing a PoP claim specification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    /// The specification was empty or whitespace only
    #[error("failed to parse PoP token claims: no claims provided")]
    Empty,

    /// An entry is not a single `key=value` pair with non-empty sides
    #[error("failed to parse PoP token claims. Ensure the claims are formatted as `key=value` with no extra whitespace (entry {entry:?})")]
    Malformed {
        /// The offending entry, untrimmed
        entry: String,
    },

    /// The same claim name appeared more than once
    #[error("failed to parse PoP token claims: claim {key:?} is specified more than once")]
    Duplicate {
        /// The repeated claim name
        key: String,
    },

    /// No `u` claim was supplied
    #[error("required u-claim not provided for PoP token flow. Please provide the ARM ID of the cluster in the format `u=<ARM_ID>`")]
    MissingResource,
}

/// Errors that can occur while producing or inspecting a PoP token
#[derive(Debug, Error)]
pub enum PopError {
    /// The signing key could not be produced or loaded
    #[error("PoP signing key unavailable: {0}")]
    KeyUnavailable(String),

    /// The key refused or failed to produce a signature
    #[error("failed to sign PoP token: {0}")]
    Signing(String),

    /// System clock is before the Unix epoch
    #[error("Clock error")]
    ClockError,

    /// JSON serialization error while building a token
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The token is not a well-formed compact JWS
    #[error("failed to parse PoP token: {0}")]
    TokenParse(String),

    /// The token header declares a type other than `pop`
    #[error("unexpected token type {actual:?}, expected \"pop\"")]
    TokenTypeMismatch {
        /// The declared type, empty when absent
        actual: String,
    },

    /// The payload has no `at` claim
    #[error("PoP token does not carry an `at` access token claim")]
    MissingAccessTokenClaim,
}

impl PopError {
    /// True for failures of the key or signing stage
    pub fn is_key_failure(&self) -> bool {
        matches!(self, PopError::KeyUnavailable(_) | PopError::Signing(_))
    }
}

/// Errors reported by a hardware-backed key store
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// No key has been provisioned under the expected name
    #[error("no key provisioned: {0}")]
    NotProvisioned(String),

    /// The store refused access to the key
    #[error("access denied")]
    AccessDenied,

    /// The store is serving another request
    #[error("key store busy")]
    Busy,

    /// Any other backend failure
    #[error("key store backend error: {0}")]
    Backend(String),
}
