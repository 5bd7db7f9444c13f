//! # PoP - Proof-of-Possession tokens for OAuth 2.0
//!
//! This crate builds access tokens that are cryptographically bound to a key
//! held by the client, in the form accepted by Microsoft Entra ID and AKS
//! clusters (`token_type=pop`). A stolen PoP token is useless without the
//! private key that signed it.
//!
//! ## Flow
//!
//! 1. [`parse_claims`] validates the claim specification (`u=<resource>,...`).
//! 2. A [`KeyProvider`] yields the signing key, either an ephemeral software
//!    key or a pre-provisioned key in a [`HardwareKeyStore`].
//! 3. [`build_confirmation`] produces the `req_cnf` parameter sent with the
//!    token request.
//! 4. Once the identity provider has issued the access token,
//!    [`PopConfirmation::sign`] wraps it in the signed PoP token.
//! 5. [`validate_token_response`] checks the shape of a PoP token and returns
//!    the inner access token.
//!
//! ## Quick Start
//!
//! ```rust
//! use oauth_pop::{build_confirmation, parse_claims, unix_now, validate_token_response, KeyProvider};
//!
//! let claims = parse_claims("u=/subscriptions/0000/resourceGroups/rg/providers/Microsoft.ContainerService/managedClusters/aks")?;
//! let key = KeyProvider::Software.load_key()?;
//! let confirmation = build_confirmation(&claims, key, unix_now()?)?;
//!
//! // send confirmation.req_cnf() with the token request, then:
//! let pop_token = confirmation.sign("access-token-from-idp")?;
//! assert_eq!(validate_token_response(&pop_token)?, "access-token-from-idp");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Algorithm Support
//!
//! PoP keys are P-256 and sign with **ES256**.

mod claims;
mod error;
mod jwk;
mod key;
mod signer;
mod thumbprint;
mod token;

pub use claims::{parse_claims, ClaimSet, RESOURCE_CLAIM};
pub use error::{ClaimsError, KeyStoreError, PopError};
pub use jwk::EcPublicJwk;
pub use key::{
    HardwareKeyStore, HardwarePopKey, KeyProvider, PopKey, SoftwarePopKey, POP_ALGORITHM,
};
pub use signer::{build_confirmation, unix_now, PopConfirmation, RESERVED_CLAIMS};
pub use thumbprint::compute_thumbprint;
pub use token::{validate_token_response, PopToken, ACCESS_TOKEN_CLAIM, POP_TOKEN_TYPE};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_software_key() {
        let claims = parse_claims("u=testhost").unwrap();
        let key = KeyProvider::Software.load_key().unwrap();
        let thumbprint = key.thumbprint().to_string();

        let confirmation = build_confirmation(&claims, key, unix_now().unwrap()).unwrap();
        let token = confirmation.sign("issued-access-token").unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert_eq!(
            validate_token_response(&token).unwrap(),
            "issued-access-token"
        );

        let parsed = PopToken::parse(&token).unwrap();
        assert_eq!(parsed.header()["kid"], thumbprint.as_str());
    }

    #[test]
    fn test_claims_error_is_not_a_key_failure() {
        let err = parse_claims("").unwrap_err();
        assert_eq!(err, ClaimsError::Empty);

        let pop_err = PopError::KeyUnavailable("tpm offline".into());
        assert!(pop_err.is_key_failure());
        assert!(!PopError::MissingAccessTokenClaim.is_key_failure());
    }
}
