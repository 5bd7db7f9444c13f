//! JWK Thumbprint computation (RFC 7638)

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

use crate::jwk::EcPublicJwk;

/// Compute the RFC 7638 thumbprint of an EC public JWK
///
/// The thumbprint is the base64url SHA-256 of the canonical JSON
/// `{"crv":"...","kty":"...","x":"...","y":"..."}`. It is the `kid` the
/// identity provider binds the issued token to.
pub fn compute_thumbprint(jwk: &EcPublicJwk) -> String {
    // Members MUST be in lexicographic order: crv < kty < x < y
    let canonical = format!(
        r#"{{"crv":"{}","kty":"{}","x":"{}","y":"{}"}}"#,
        jwk.crv, jwk.kty, jwk.x, jwk.y
    );

    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}
