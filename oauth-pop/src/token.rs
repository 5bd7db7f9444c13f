//! PoP token parsing and shape validation
//!
//! Only the structure is inspected here. The identity provider's signature
//! over the inner access token is verified by the resource server against
//! the provider's published keys, not by the client.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};

use crate::error::PopError;

/// Header `typ` of a PoP token
pub const POP_TOKEN_TYPE: &str = "pop";

/// Name of the claim carrying the inner access token
pub const ACCESS_TOKEN_CLAIM: &str = "at";

/// A decoded (unverified) PoP token
#[derive(Debug, Clone)]
pub struct PopToken {
    header: Map<String, Value>,
    claims: Map<String, Value>,
}

impl PopToken {
    /// Decode a compact JWS without verifying its signature
    pub fn parse(token: &str) -> Result<Self, PopError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(PopError::TokenParse(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        }
        if parts[2].is_empty() {
            return Err(PopError::TokenParse("missing signature".to_string()));
        }

        Ok(Self {
            header: decode_segment(parts[0], "header")?,
            claims: decode_segment(parts[1], "payload")?,
        })
    }

    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Declared `typ` header
    pub fn token_type(&self) -> Option<&str> {
        self.header.get("typ").and_then(Value::as_str)
    }

    /// The inner access token (`at` claim)
    pub fn access_token(&self) -> Option<&str> {
        self.claims.get(ACCESS_TOKEN_CLAIM).and_then(Value::as_str)
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

fn decode_segment(segment: &str, what: &str) -> Result<Map<String, Value>, PopError> {
    // Tolerate padded base64url
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| PopError::TokenParse(format!("{what} is not base64url: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PopError::TokenParse(format!("{what} is not a JSON object"))),
        Err(e) => Err(PopError::TokenParse(format!("{what} is not JSON: {e}"))),
    }
}

/// Check that `token` is a PoP token and return its `at` claim
pub fn validate_token_response(token: &str) -> Result<String, PopError> {
    let parsed = PopToken::parse(token)?;

    match parsed.token_type() {
        Some(POP_TOKEN_TYPE) => {}
        other => {
            return Err(PopError::TokenTypeMismatch {
                actual: other.unwrap_or_default().to_string(),
            })
        }
    }

    parsed
        .access_token()
        .filter(|at| !at.is_empty())
        .map(String::from)
        .ok_or(PopError::MissingAccessTokenClaim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(header: &str, payload: &str) -> String {
        format!(
            "{}.{}.c2ln",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_extracts_access_token() {
        let token = encode(
            r#"{"typ":"pop","alg":"ES256"}"#,
            r#"{"at":"inner","u":"testhost","ts":1}"#,
        );

        assert_eq!(validate_token_response(&token).unwrap(), "inner");
    }

    #[test]
    fn test_rejects_bearer_jwt() {
        let token = encode(r#"{"typ":"JWT","alg":"RS256"}"#, r#"{"at":"inner"}"#);

        match validate_token_response(&token) {
            Err(PopError::TokenTypeMismatch { actual }) => assert_eq!(actual, "JWT"),
            other => panic!("expected type mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_typ_is_case_sensitive() {
        let token = encode(r#"{"typ":"POP","alg":"ES256"}"#, r#"{"at":"inner"}"#);

        match validate_token_response(&token) {
            Err(PopError::TokenTypeMismatch { actual }) => assert_eq!(actual, "POP"),
            other => panic!("expected type mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_missing_typ() {
        let token = encode(r#"{"alg":"ES256"}"#, r#"{"at":"inner"}"#);

        assert!(matches!(
            validate_token_response(&token),
            Err(PopError::TokenTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_at_claim() {
        let token = encode(r#"{"typ":"pop"}"#, r#"{"u":"testhost"}"#);

        assert!(matches!(
            validate_token_response(&token),
            Err(PopError::MissingAccessTokenClaim)
        ));
    }

    #[test]
    fn test_malformed_tokens() {
        let unsigned = format!("{}.e30.", URL_SAFE_NO_PAD.encode(r#"{"typ":"pop"}"#));
        let array_header = format!("{}.e30.c2ln", URL_SAFE_NO_PAD.encode("[1,2]"));

        for bad in [
            "",
            "only.two",
            "a.b.c.d",
            "!!!.e30.c2ln",
            unsigned.as_str(),
            array_header.as_str(),
        ] {
            assert!(
                matches!(validate_token_response(bad), Err(PopError::TokenParse(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_padded_segments_are_accepted() {
        let header = base64::engine::general_purpose::URL_SAFE.encode(r#"{"typ":"pop"}"#);
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"at":"x"}"#);
        let token = format!("{header}.{payload}.c2ln");

        assert_eq!(validate_token_response(&token).unwrap(), "x");
    }
}
