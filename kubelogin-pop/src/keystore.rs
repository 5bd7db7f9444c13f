//! OS keychain backed PoP key store
//!
//! The key is a P-256 private scalar stored base64-encoded under
//! `kubelogin-pop` / `pop-key` (Keychain on macOS, Secret Service on Linux,
//! Credential Manager on Windows). It is provisioned out of band; this store
//! only reads it.
//!
//! This store does not keep the key out of process. Every public key lookup
//! and every signature reads the scalar from the keychain into process
//! memory; the keychain only protects it at rest. Use a hardware-backed
//! [`HardwareKeyStore`] where the key must never enter the process.

use base64::{engine::general_purpose::STANDARD, Engine};
use keyring::Entry;
use oauth_pop::{HardwareKeyStore, KeyStoreError};
use p256::ecdsa::{signature::Signer, Signature, SigningKey, VerifyingKey};

const SERVICE_NAME: &str = "kubelogin-pop";
const ACCOUNT_NAME: &str = "pop-key";

/// Keychain entry holding the PoP key; decoded in process on each use
pub struct KeychainKeyStore {
    service: String,
    account: String,
}

impl KeychainKeyStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn signing_key(&self) -> Result<SigningKey, KeyStoreError> {
        let entry = Entry::new(&self.service, &self.account)
            .map_err(|e| KeyStoreError::Backend(e.to_string()))?;

        let encoded = entry.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => {
                KeyStoreError::NotProvisioned(format!("{}/{}", self.service, self.account))
            }
            keyring::Error::NoStorageAccess(_) => KeyStoreError::AccessDenied,
            _ => KeyStoreError::Backend(e.to_string()),
        })?;

        decode_signing_key(&encoded)
    }
}

impl Default for KeychainKeyStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME, ACCOUNT_NAME)
    }
}

impl HardwareKeyStore for KeychainKeyStore {
    fn name(&self) -> &str {
        "keychain"
    }

    fn public_key(&self) -> Result<VerifyingKey, KeyStoreError> {
        Ok(self.signing_key()?.verifying_key().clone())
    }

    fn sign(&self, message: &[u8]) -> Result<Signature, KeyStoreError> {
        let key = self.signing_key()?;
        key.try_sign(message)
            .map_err(|e| KeyStoreError::Backend(e.to_string()))
    }
}

/// Decode a base64 (standard alphabet) P-256 private scalar
fn decode_signing_key(encoded: &str) -> Result<SigningKey, KeyStoreError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| KeyStoreError::Backend(format!("Base64 decode error: {e}")))?;

    SigningKey::from_slice(&bytes)
        .map_err(|_| KeyStoreError::Backend("stored value is not a P-256 private key".to_string()))
}
