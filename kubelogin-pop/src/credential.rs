//! Client credentials for the confidential-client flow

use std::fmt;
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use pkcs8::EncryptedPrivateKeyInfo;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::options::{ConfigError, LoginMethod, Options};

/// `client_assertion_type` for certificate credentials
pub const JWT_BEARER_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of a client assertion
const ASSERTION_LIFETIME_SECS: i64 = 600;

const ENCRYPTED_KEY_TAG: &str = "ENCRYPTED PRIVATE KEY";
const PLAIN_KEY_TAG: &str = "PRIVATE KEY";

/// Secret or certificate proving the client's identity
#[derive(Clone)]
pub enum ClientCredential {
    Secret(String),
    /// PEM holding the certificate and its private key
    Certificate(CertificateCredential),
}

#[derive(Clone)]
pub struct CertificateCredential {
    /// `x5t#S256` of the certificate
    thumbprint: String,
    /// PEM of the private key alone
    key_pem: String,
    algorithm: Algorithm,
}

#[derive(Debug, Serialize)]
struct AssertionClaims {
    aud: String,
    exp: i64,
    iat: i64,
    iss: String,
    jti: String,
    nbf: i64,
    sub: String,
}

impl ClientCredential {
    /// Pick the credential configured for a service principal login
    ///
    /// A client secret wins over a certificate when both are set.
    pub fn from_options(options: &Options) -> Result<Self, ConfigError> {
        if !options.client_secret.is_empty() {
            return Ok(Self::Secret(options.client_secret.clone()));
        }
        if !options.client_cert.is_empty() {
            return Self::from_certificate_file(
                Path::new(&options.client_cert),
                &options.client_cert_password,
            );
        }
        Err(ConfigError::MissingValue(
            "client secret or client certificate",
            LoginMethod::ServicePrincipal,
        ))
    }

    pub fn from_certificate_file(path: &Path, password: &str) -> Result<Self, ConfigError> {
        let pem_content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidCredential(format!(
                "failed to read certificate file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_certificate_pem(&pem_content, password)
    }

    /// Parse a PEM bundle; `password` decrypts an `ENCRYPTED PRIVATE KEY`
    pub fn from_certificate_pem(pem_content: &str, password: &str) -> Result<Self, ConfigError> {
        Ok(Self::Certificate(CertificateCredential::parse(
            pem_content,
            password,
        )?))
    }

    /// `secret` or `certificate`, as used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            ClientCredential::Secret(_) => "secret",
            ClientCredential::Certificate(_) => "certificate",
        }
    }

    /// Form parameters authenticating the client at `token_endpoint`
    pub fn form_params(
        &self,
        client_id: &str,
        token_endpoint: &str,
    ) -> Result<Vec<(&'static str, String)>, ConfigError> {
        match self {
            ClientCredential::Secret(secret) => Ok(vec![("client_secret", secret.clone())]),
            ClientCredential::Certificate(cert) => Ok(vec![
                (
                    "client_assertion_type",
                    JWT_BEARER_ASSERTION_TYPE.to_string(),
                ),
                (
                    "client_assertion",
                    cert.client_assertion(client_id, token_endpoint)?,
                ),
            ]),
        }
    }
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCredential::Secret(_) => f.debug_tuple("Secret").field(&"[redacted]").finish(),
            ClientCredential::Certificate(cert) => f.debug_tuple("Certificate").field(cert).finish(),
        }
    }
}

impl CertificateCredential {
    fn parse(pem_content: &str, password: &str) -> Result<Self, ConfigError> {
        let entries = pem::parse_many(pem_content)
            .map_err(|e| ConfigError::InvalidCredential(format!("failed to parse PEM: {e}")))?;

        let cert = entries
            .iter()
            .find(|p| p.tag() == "CERTIFICATE")
            .ok_or_else(|| ConfigError::InvalidCredential("no certificate found in PEM".to_string()))?;
        let key = entries
            .iter()
            .find(|p| p.tag().ends_with("PRIVATE KEY"))
            .ok_or_else(|| ConfigError::InvalidCredential("no private key found in PEM".to_string()))?;

        let thumbprint = URL_SAFE_NO_PAD.encode(Sha256::digest(cert.contents()));
        let key = match key.tag() {
            ENCRYPTED_KEY_TAG => decrypt_private_key(key.contents(), password)?,
            _ => key.clone(),
        };
        let key_pem = pem::encode(&key);

        let algorithm = match key.tag() {
            "RSA PRIVATE KEY" => Algorithm::RS256,
            "EC PRIVATE KEY" => Algorithm::ES256,
            // PKCS#8 does not say which; try RSA first
            _ if EncodingKey::from_rsa_pem(key_pem.as_bytes()).is_ok() => Algorithm::RS256,
            _ => Algorithm::ES256,
        };

        let credential = Self {
            thumbprint,
            key_pem,
            algorithm,
        };
        credential.encoding_key()?;
        Ok(credential)
    }

    fn encoding_key(&self) -> Result<EncodingKey, ConfigError> {
        let key = match self.algorithm {
            Algorithm::RS256 => EncodingKey::from_rsa_pem(self.key_pem.as_bytes()),
            _ => EncodingKey::from_ec_pem(self.key_pem.as_bytes()),
        };
        key.map_err(|e| ConfigError::InvalidCredential(format!("unsupported private key: {e}")))
    }

    /// Signed JWT authenticating `client_id` to `audience`
    pub fn client_assertion(&self, client_id: &str, audience: &str) -> Result<String, ConfigError> {
        let mut header = Header::new(self.algorithm);
        header.x5t_s256 = Some(self.thumbprint.clone());

        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            aud: audience.to_string(),
            exp: now + ASSERTION_LIFETIME_SECS,
            iat: now,
            iss: client_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            sub: client_id.to_string(),
        };

        encode(&header, &claims, &self.encoding_key()?).map_err(|e| {
            ConfigError::InvalidCredential(format!("failed to create client assertion: {e}"))
        })
    }

    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }
}

/// Decrypt PKCS#8 `EncryptedPrivateKeyInfo` DER into a `PRIVATE KEY` block
fn decrypt_private_key(der: &[u8], password: &str) -> Result<pem::Pem, ConfigError> {
    if password.is_empty() {
        return Err(ConfigError::InvalidCredential(
            "private key is encrypted but no client certificate password was given".to_string(),
        ));
    }

    let encrypted = EncryptedPrivateKeyInfo::try_from(der).map_err(|e| {
        ConfigError::InvalidCredential(format!("failed to parse encrypted private key: {e}"))
    })?;
    let document = encrypted.decrypt(password).map_err(|e| {
        ConfigError::InvalidCredential(format!("failed to decrypt private key: {e}"))
    })?;

    Ok(pem::Pem::new(PLAIN_KEY_TAG, document.as_bytes().to_vec()))
}

impl fmt::Debug for CertificateCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateCredential")
            .field("thumbprint", &self.thumbprint)
            .field("algorithm", &self.algorithm)
            .field("key_pem", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::rand_core::OsRng;
    use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use serde::Deserialize;
    use tempfile::TempDir;

    const FAKE_CERT_DER: &[u8] = b"not really DER but hashed all the same";

    fn cert_pem() -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", FAKE_CERT_DER.to_vec()))
    }

    /// Certificate plus PKCS#8 key, and the matching public key PEM
    pub(crate) fn ec_bundle() -> (String, String) {
        let key = SigningKey::random(&mut OsRng);
        let private = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public = key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (format!("{}{}", cert_pem(), private.as_str()), public)
    }

    #[derive(Debug, Deserialize)]
    struct Decoded {
        aud: String,
        iss: String,
        sub: String,
        exp: i64,
        nbf: i64,
        jti: String,
    }

    #[test]
    fn test_secret_form_params() {
        let cred = ClientCredential::Secret("s3cret".to_string());

        assert_eq!(cred.kind(), "secret");
        let params = cred.form_params("client", "https://idp/token").unwrap();
        assert_eq!(params, vec![("client_secret", "s3cret".to_string())]);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cred = ClientCredential::Secret("s3cret".to_string());
        assert!(!format!("{cred:?}").contains("s3cret"));
    }

    #[test]
    fn test_certificate_assertion() {
        let (bundle, public_pem) = ec_bundle();
        let cred = ClientCredential::from_certificate_pem(&bundle, "").unwrap();
        assert_eq!(cred.kind(), "certificate");

        let params = cred
            .form_params("client-id", "https://login.example.com/t/oauth2/v2.0/token")
            .unwrap();
        assert_eq!(params[0], ("client_assertion_type", JWT_BEARER_ASSERTION_TYPE.to_string()));
        let assertion = &params[1].1;

        let header = decode_header(assertion).unwrap();
        assert_eq!(header.alg, Algorithm::ES256);
        assert_eq!(
            header.x5t_s256.as_deref(),
            Some(URL_SAFE_NO_PAD.encode(Sha256::digest(FAKE_CERT_DER)).as_str())
        );

        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_audience(&["https://login.example.com/t/oauth2/v2.0/token"]);
        let decoded = decode::<Decoded>(
            assertion,
            &DecodingKey::from_ec_pem(public_pem.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap()
        .claims;

        assert_eq!(decoded.aud, "https://login.example.com/t/oauth2/v2.0/token");
        assert_eq!(decoded.iss, "client-id");
        assert_eq!(decoded.sub, "client-id");
        assert_eq!(decoded.exp - decoded.nbf, ASSERTION_LIFETIME_SECS);
        assert!(!decoded.jti.is_empty());
    }

    #[test]
    fn test_assertions_are_unique() {
        let (bundle, _) = ec_bundle();
        let ClientCredential::Certificate(cert) =
            ClientCredential::from_certificate_pem(&bundle, "").unwrap()
        else {
            panic!("expected certificate credential");
        };

        let a = cert.client_assertion("c", "aud").unwrap();
        let b = cert.client_assertion("c", "aud").unwrap();
        assert_ne!(a, b);
    }

    fn encrypted_ec_bundle(password: &str) -> (String, String) {
        let key = SigningKey::random(&mut OsRng);
        let private = key
            .to_pkcs8_encrypted_pem(&mut OsRng, password, LineEnding::LF)
            .unwrap();
        let public = key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (format!("{}{}", cert_pem(), private.as_str()), public)
    }

    #[test]
    fn test_encrypted_key_with_password() {
        let (bundle, public_pem) = encrypted_ec_bundle("hunter2");
        assert!(bundle.contains("ENCRYPTED PRIVATE KEY"));

        let ClientCredential::Certificate(cert) =
            ClientCredential::from_certificate_pem(&bundle, "hunter2").unwrap()
        else {
            panic!("expected certificate credential");
        };
        assert_eq!(cert.algorithm, Algorithm::ES256);

        let assertion = cert.client_assertion("client-id", "aud").unwrap();
        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_audience(&["aud"]);
        let decoded = decode::<Decoded>(
            &assertion,
            &DecodingKey::from_ec_pem(public_pem.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap()
        .claims;
        assert_eq!(decoded.iss, "client-id");
    }

    #[test]
    fn test_encrypted_key_wrong_password() {
        let (bundle, _) = encrypted_ec_bundle("hunter2");
        let err = ClientCredential::from_certificate_pem(&bundle, "hunter3").unwrap_err();
        assert!(err.to_string().contains("failed to decrypt private key"));
    }

    #[test]
    fn test_encrypted_key_requires_password() {
        let (bundle, _) = encrypted_ec_bundle("hunter2");
        let err = ClientCredential::from_certificate_pem(&bundle, "").unwrap_err();
        assert!(err.to_string().contains("no client certificate password"));
    }

    #[test]
    fn test_password_ignored_for_plain_key() {
        let (bundle, _) = ec_bundle();
        let cred = ClientCredential::from_certificate_pem(&bundle, "hunter2").unwrap();
        assert_eq!(cred.kind(), "certificate");
    }

    #[test]
    fn test_certificate_without_key_rejected() {
        let err = ClientCredential::from_certificate_pem(&cert_pem(), "").unwrap_err();
        assert!(err.to_string().contains("no private key"));
    }

    #[test]
    fn test_key_without_certificate_rejected() {
        let key = SigningKey::random(&mut OsRng);
        let private = key.to_pkcs8_pem(LineEnding::LF).unwrap();

        let err = ClientCredential::from_certificate_pem(private.as_str(), "").unwrap_err();
        assert!(err.to_string().contains("no certificate"));
    }

    #[test]
    fn test_from_options() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("client.pem");
        std::fs::write(&path, ec_bundle().0).unwrap();

        let mut o = Options::new();
        assert!(matches!(
            ClientCredential::from_options(&o),
            Err(ConfigError::MissingValue(..))
        ));

        o.client_cert = path.display().to_string();
        assert_eq!(ClientCredential::from_options(&o).unwrap().kind(), "certificate");

        o.client_secret = "s3cret".to_string();
        assert_eq!(ClientCredential::from_options(&o).unwrap().kind(), "secret");
    }

    #[test]
    fn test_missing_certificate_file() {
        let err = ClientCredential::from_certificate_file(Path::new("/nonexistent/cert.pem"), "")
            .unwrap_err();
        assert!(err.to_string().contains("failed to read certificate file"));
    }
}
