//! PoP request confirmation and token signing
//!
//! Binding a token to a key happens in two halves:
//! 1. Before the token request, [`build_confirmation`] derives the `req_cnf`
//!    parameter (`base64url({"kid":"<thumbprint>"})`) that asks the identity
//!    provider to bind the access token it issues to the key.
//! 2. After the provider answers, [`PopConfirmation::sign`] wraps the issued
//!    access token in a signed PoP token (header `typ: "pop"`) carrying `at`,
//!    `ts`, `cnf.jwk` and every claim of the [`ClaimSet`] at the top level.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use tracing::warn;

use crate::claims::ClaimSet;
use crate::error::PopError;
use crate::key::PopKey;
use crate::token::POP_TOKEN_TYPE;

/// Claim names written by the signer itself; user claims may not shadow them
pub const RESERVED_CLAIMS: [&str; 3] = ["at", "ts", "cnf"];

/// Key binding prepared for one token request
pub struct PopConfirmation {
    key: Arc<dyn PopKey>,
    claims: ClaimSet,
    issued_at: i64,
    req_cnf: String,
}

/// Bind `claims` to `key` for a request issued at `issued_at` (Unix seconds)
pub fn build_confirmation(
    claims: &ClaimSet,
    key: Arc<dyn PopKey>,
    issued_at: i64,
) -> Result<PopConfirmation, PopError> {
    let req_cnf_json = serde_json::to_string(&serde_json::json!({ "kid": key.thumbprint() }))?;
    let req_cnf = URL_SAFE_NO_PAD.encode(req_cnf_json.as_bytes());

    Ok(PopConfirmation {
        key,
        claims: claims.clone(),
        issued_at,
        req_cnf,
    })
}

/// Current time as Unix seconds
pub fn unix_now() -> Result<i64, PopError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|_| PopError::ClockError)
}

impl PopConfirmation {
    /// Value of the `req_cnf` token request parameter
    pub fn req_cnf(&self) -> &str {
        &self.req_cnf
    }

    /// Thumbprint (`kid`) of the bound key
    pub fn thumbprint(&self) -> &str {
        self.key.thumbprint()
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    /// Wrap `access_token` in a PoP token signed by the bound key
    ///
    /// Output is a compact JWS; identical confirmations produce identical
    /// tokens for the same access token.
    pub fn sign(&self, access_token: &str) -> Result<String, PopError> {
        let header = serde_json::json!({
            "typ": POP_TOKEN_TYPE,
            "alg": self.key.algorithm(),
            "kid": self.key.thumbprint(),
        });

        let mut payload = Map::new();
        for (name, value) in self.claims.iter() {
            if RESERVED_CLAIMS.contains(&name) {
                warn!(claim = name, "Ignoring PoP claim that shadows a reserved claim");
                continue;
            }
            payload.insert(name.to_string(), Value::String(value.to_string()));
        }
        payload.insert("at".to_string(), Value::String(access_token.to_string()));
        payload.insert("ts".to_string(), Value::from(self.issued_at));
        payload.insert(
            "cnf".to_string(),
            serde_json::json!({ "jwk": self.key.public_jwk().to_value() }),
        );

        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&Value::Object(payload))?);

        let message = format!("{}.{}", header_b64, payload_b64);
        let signature = self.key.sign(message.as_bytes())?;

        Ok(format!("{}.{}", message, URL_SAFE_NO_PAD.encode(signature)))
    }
}

impl std::fmt::Debug for PopConfirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopConfirmation")
            .field("kid", &self.key.thumbprint())
            .field("claims", &self.claims)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}
