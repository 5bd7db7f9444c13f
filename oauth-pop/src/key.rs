//! PoP signing keys and the providers that produce them
//!
//! Two backends implement [`PopKey`]:
//! - [`SoftwarePopKey`]: an ephemeral P-256 key generated in memory per request
//! - [`HardwarePopKey`]: a pre-provisioned key living in a [`HardwareKeyStore`]
//!
//! [`KeyProvider`] selects between them once, at configuration time.

use std::fmt;
use std::sync::Arc;

use p256::ecdsa::{signature::Signer, Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use tracing::debug;

use crate::error::{KeyStoreError, PopError};
use crate::jwk::EcPublicJwk;
use crate::thumbprint::compute_thumbprint;

/// JWS algorithm used by every PoP key
pub const POP_ALGORITHM: &str = "ES256";

/// Attempts at drawing a valid scalar before giving up
const MAX_KEYGEN_ATTEMPTS: usize = 4;

/// A key the PoP token is bound to
pub trait PopKey: Send + Sync {
    /// RFC 7638 thumbprint of the public key, used as `kid`
    fn thumbprint(&self) -> &str;

    /// Public key in JWK form, embedded in `cnf`
    fn public_jwk(&self) -> &EcPublicJwk;

    /// JWS `alg` of signatures produced by [`PopKey::sign`]
    fn algorithm(&self) -> &'static str {
        POP_ALGORITHM
    }

    /// Sign `message`, returning the raw JWS signature bytes (r || s)
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, PopError>;
}

/// Ephemeral in-memory key
///
/// Never written anywhere; dropped with the request that created it.
pub struct SoftwarePopKey {
    signing_key: SigningKey,
    jwk: EcPublicJwk,
    thumbprint: String,
}

impl SoftwarePopKey {
    /// Generate a fresh P-256 key from the OS entropy source
    pub fn generate() -> Result<Self, PopError> {
        let mut seed = [0u8; 32];
        for _ in 0..MAX_KEYGEN_ATTEMPTS {
            OsRng
                .try_fill_bytes(&mut seed)
                .map_err(|e| PopError::KeyUnavailable(format!("entropy source failed: {e}")))?;

            // Rejects zero and values above the curve order; redraw on failure
            if let Ok(signing_key) = SigningKey::from_slice(&seed) {
                seed.fill(0);
                return Self::from_signing_key(signing_key);
            }
        }
        seed.fill(0);

        Err(PopError::KeyUnavailable(
            "could not derive a valid P-256 scalar".to_string(),
        ))
    }

    /// Wrap an existing signing key
    pub fn from_signing_key(signing_key: SigningKey) -> Result<Self, PopError> {
        let jwk = EcPublicJwk::from_verifying_key(signing_key.verifying_key())?;
        let thumbprint = compute_thumbprint(&jwk);
        Ok(Self {
            signing_key,
            jwk,
            thumbprint,
        })
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl PopKey for SoftwarePopKey {
    fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    fn public_jwk(&self) -> &EcPublicJwk {
        &self.jwk
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, PopError> {
        let signature: Signature = self
            .signing_key
            .try_sign(message)
            .map_err(|e| PopError::Signing(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

impl fmt::Debug for SoftwarePopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwarePopKey")
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

/// A persistent key store behind [`KeyProvider::Hardware`]
///
/// Hardware-backed implementations keep the private key out of process
/// memory. Software stores such as an OS keychain only protect it at rest.
///
/// Implementations may block (hardware round trips, OS prompts) and may
/// serialize concurrent requests; contention is reported as
/// [`KeyStoreError::Busy`].
pub trait HardwareKeyStore: Send + Sync {
    /// Human-readable name of the backend, used in logs
    fn name(&self) -> &str;

    /// Public half of the provisioned key
    fn public_key(&self) -> Result<VerifyingKey, KeyStoreError>;

    /// ES256 signature over `message`
    fn sign(&self, message: &[u8]) -> Result<Signature, KeyStoreError>;
}

/// Key bound to a [`HardwareKeyStore`]
///
/// Loading never creates key material; it only reads the public half.
pub struct HardwarePopKey {
    store: Arc<dyn HardwareKeyStore>,
    jwk: EcPublicJwk,
    thumbprint: String,
}

impl HardwarePopKey {
    pub fn load(store: Arc<dyn HardwareKeyStore>) -> Result<Self, PopError> {
        let public_key = store
            .public_key()
            .map_err(|e| PopError::KeyUnavailable(format!("{}: {e}", store.name())))?;
        let jwk = EcPublicJwk::from_verifying_key(&public_key)?;
        let thumbprint = compute_thumbprint(&jwk);

        debug!(store = store.name(), thumbprint = %thumbprint, "Loaded hardware PoP key");

        Ok(Self {
            store,
            jwk,
            thumbprint,
        })
    }
}

impl PopKey for HardwarePopKey {
    fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    fn public_jwk(&self) -> &EcPublicJwk {
        &self.jwk
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, PopError> {
        let signature = self
            .store
            .sign(message)
            .map_err(|e| PopError::Signing(format!("{}: {e}", self.store.name())))?;
        Ok(signature.to_bytes().to_vec())
    }
}

impl fmt::Debug for HardwarePopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwarePopKey")
            .field("store", &self.store.name())
            .field("thumbprint", &self.thumbprint)
            .finish()
    }
}

/// Selects where PoP keys come from
#[derive(Clone)]
pub enum KeyProvider {
    /// Fresh ephemeral key for every request
    Software,
    /// Pre-provisioned key in a hardware or OS key store
    Hardware(Arc<dyn HardwareKeyStore>),
}

impl KeyProvider {
    /// Produce the key for one token request
    ///
    /// May block when backed by a hardware store; async callers should run
    /// it on a blocking thread.
    pub fn load_key(&self) -> Result<Arc<dyn PopKey>, PopError> {
        match self {
            KeyProvider::Software => Ok(Arc::new(SoftwarePopKey::generate()?)),
            KeyProvider::Hardware(store) => Ok(Arc::new(HardwarePopKey::load(Arc::clone(store))?)),
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, KeyProvider::Hardware(_))
    }
}

impl fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyProvider::Software => f.write_str("Software"),
            KeyProvider::Hardware(store) => f.debug_tuple("Hardware").field(&store.name()).finish(),
        }
    }
}
