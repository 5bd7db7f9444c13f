//! JSON Web Key (JWK) types for PoP keys

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::error::PopError;

/// EC public key in JWK format (P-256/ES256)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcPublicJwk {
    /// Key type (always "EC")
    pub kty: String,
    /// Curve name (always "P-256")
    pub crv: String,
    /// X coordinate (base64url-encoded)
    pub x: String,
    /// Y coordinate (base64url-encoded)
    pub y: String,
}

impl EcPublicJwk {
    /// Create a P-256 JWK from encoded coordinates
    pub fn new(x: String, y: String) -> Self {
        Self {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x,
            y,
        }
    }

    /// Build the JWK for a verifying key
    pub fn from_verifying_key(verifying_key: &VerifyingKey) -> Result<Self, PopError> {
        let point = verifying_key.to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| PopError::KeyUnavailable("public key has no x coordinate".into()))?;
        let y = point
            .y()
            .ok_or_else(|| PopError::KeyUnavailable("public key has no y coordinate".into()))?;

        Ok(Self::new(URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y)))
    }

    /// Recover the verifying key described by this JWK
    pub fn to_verifying_key(&self) -> Result<VerifyingKey, PopError> {
        let invalid = || PopError::KeyUnavailable("invalid JWK coordinates".into());
        if self.kty != "EC" || self.crv != "P-256" {
            return Err(invalid());
        }

        let x = URL_SAFE_NO_PAD.decode(&self.x).map_err(|_| invalid())?;
        let y = URL_SAFE_NO_PAD.decode(&self.y).map_err(|_| invalid())?;
        if x.len() != 32 || y.len() != 32 {
            return Err(invalid());
        }

        // Uncompressed SEC1 point: 0x04 || x || y
        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        sec1.extend_from_slice(&x);
        sec1.extend_from_slice(&y);

        VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| invalid())
    }

    /// The JWK as a JSON value, for embedding in `cnf`
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": self.kty,
            "crv": self.crv,
            "x": self.x,
            "y": self.y,
        })
    }
}
