//! Confidential-client token exchange
//!
//! Exchanges a service principal credential for an access token at the
//! identity provider's v2.0 token endpoint. In the PoP flow the request
//! carries `token_type=pop` and `req_cnf`, and the issued access token is
//! wrapped in a PoP token signed by the request's key.
//!
//! Every network round trip and every key store call races the caller's
//! [`CancellationToken`]; the network part is also bounded by the client's
//! timeout.

use std::sync::Arc;
use std::time::Duration;

use oauth_pop::{
    build_confirmation, unix_now, validate_token_response, ClaimSet, KeyProvider, PopConfirmation,
    PopError, PopKey, POP_TOKEN_TYPE,
};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cloud::CloudConfiguration;
use crate::credential::ClientCredential;
use crate::options::{ConfigError, LoginMethod, Options, DEFAULT_TIMEOUT};

/// Errors from a token acquisition
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Key or signing stage failed
    #[error("failed to acquire PoP token: {0}")]
    PoPTokenAcquisition(#[source] PopError),

    /// The identity provider rejected the PoP request or could not be reached
    #[error("failed to create service principal PoP token using {credential}: {message}")]
    ServicePrincipalPoPToken {
        credential: &'static str,
        message: String,
    },

    /// The identity provider rejected the bearer request or could not be reached
    #[error("failed to create service principal token using {credential}: {message}")]
    ServicePrincipalToken {
        credential: &'static str,
        message: String,
    },

    /// The signed token did not pass structural validation
    #[error("invalid PoP token: {0}")]
    InvalidPoPToken(#[source] PopError),

    #[error("token acquisition cancelled")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AcquireError {
    /// True when the failure stems from the caller's configuration
    pub fn is_config_error(&self) -> bool {
        matches!(self, AcquireError::Config(_))
    }
}

/// Settings of a [`ConfidentialClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub cloud: CloudConfiguration,
    pub client_id: String,
    /// Transport override, mainly for tests
    pub http_client: Option<reqwest::Client>,
    /// Skip the OpenID configuration lookup and use the conventional token path
    pub disable_instance_discovery: bool,
    pub timeout: Duration,
}

impl ClientOptions {
    pub fn new(cloud: CloudConfiguration, client_id: impl Into<String>) -> Self {
        Self {
            cloud,
            client_id: client_id.into(),
            http_client: None,
            disable_instance_discovery: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Access token plus its expiry (Unix seconds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredToken {
    pub token: String,
    pub expires_on: i64,
}

/// A service principal able to request tokens
///
/// Immutable once built; share it freely between concurrent acquisitions.
#[derive(Debug, Clone)]
pub struct ConfidentialClient {
    credential: ClientCredential,
    cloud: CloudConfiguration,
    client_id: String,
    disable_instance_discovery: bool,
    timeout: Duration,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    /// `expires_in` arrives as a number or a numeric string depending on the endpoint
    fn expires_in(&self) -> Option<i64> {
        match self.expires_in.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Absolute expiry for a token issued at `issued_at`
    fn expires_on(&self, issued_at: i64) -> Result<i64, String> {
        match self.expires_in() {
            Some(secs) if secs > 0 => issued_at
                .checked_add(secs)
                .ok_or_else(|| format!("expires_in {secs} is out of range")),
            Some(secs) => Err(format!("expires_in must be positive, got {secs}")),
            None => Err("token response has no usable expires_in".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenIdConfiguration {
    token_endpoint: String,
}

/// Failure of one HTTP exchange, before it is attributed to a flow
enum RequestError {
    Cancelled,
    Failed(String),
}

impl ConfidentialClient {
    pub fn new(credential: ClientCredential, options: ClientOptions) -> Self {
        Self {
            credential,
            cloud: options.cloud,
            client_id: options.client_id,
            disable_instance_discovery: options.disable_instance_discovery,
            timeout: options.timeout,
            http: options.http_client.unwrap_or_default(),
        }
    }

    /// Build a service principal client from validated options
    pub fn from_options(options: &Options) -> Result<Self, ConfigError> {
        if options.client_id.is_empty() {
            return Err(ConfigError::MissingValue(
                "client ID",
                LoginMethod::ServicePrincipal,
            ));
        }
        let credential = ClientCredential::from_options(options)?;

        let client_options = ClientOptions {
            disable_instance_discovery: options.disable_instance_discovery,
            timeout: options.timeout,
            ..ClientOptions::new(options.cloud_configuration(), options.client_id.clone())
        };
        Ok(Self::new(credential, client_options))
    }

    pub fn credential(&self) -> &ClientCredential {
        &self.credential
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn token_endpoint(&self, tenant_id: &str) -> Result<String, String> {
        if self.disable_instance_discovery {
            return Ok(self.cloud.token_endpoint(tenant_id));
        }

        let discovery = self.cloud.discovery_endpoint(tenant_id);
        debug!(url = %discovery, "Fetching OpenID configuration");

        let response = self
            .http
            .get(&discovery)
            .send()
            .await
            .map_err(|e| format!("instance discovery failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!(
                "instance discovery failed with status {status}: {body}"
            ));
        }

        let config: OpenIdConfiguration = response
            .json()
            .await
            .map_err(|e| format!("invalid OpenID configuration: {e}"))?;
        Ok(config.token_endpoint)
    }

    async fn post_token_request(
        &self,
        tenant_id: &str,
        scopes: &[String],
        req_cnf: Option<&str>,
    ) -> Result<TokenResponse, String> {
        let endpoint = self.token_endpoint(tenant_id).await?;

        let mut params: Vec<(&str, String)> = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
            ("scope", scopes.join(" ")),
        ];
        params.extend(
            self.credential
                .form_params(&self.client_id, &endpoint)
                .map_err(|e| e.to_string())?,
        );
        if let Some(req_cnf) = req_cnf {
            params.push(("token_type", POP_TOKEN_TYPE.to_string()));
            params.push(("req_cnf", req_cnf.to_string()));
        }

        debug!(endpoint = %endpoint, pop = req_cnf.is_some(), "Sending token request");

        let response = self
            .http
            .post(&endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| format!("token request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("HTTP {status}: {body}"));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| format!("invalid token response: {e}"))
    }

    /// One token request, raced against cancellation and the timeout
    async fn request_token(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        scopes: &[String],
        req_cnf: Option<&str>,
    ) -> Result<TokenResponse, RequestError> {
        let request = tokio::time::timeout(
            self.timeout,
            self.post_token_request(tenant_id, scopes, req_cnf),
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RequestError::Cancelled),
            result = request => match result {
                Ok(response) => response.map_err(RequestError::Failed),
                Err(_) => Err(RequestError::Failed(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs_f64()
                ))),
            },
        }
    }

    /// Acquire a PoP token; see [`acquire_pop_token_confidential`]
    pub async fn acquire_pop_token(
        &self,
        cancel: &CancellationToken,
        claims: &ClaimSet,
        scopes: &[String],
        tenant_id: &str,
        key_provider: &KeyProvider,
    ) -> Result<AcquiredToken, AcquireError> {
        acquire_pop_token_confidential(cancel, claims, scopes, self, tenant_id, key_provider).await
    }

    /// Acquire a plain bearer token
    pub async fn acquire_token(
        &self,
        cancel: &CancellationToken,
        scopes: &[String],
        tenant_id: &str,
    ) -> Result<AcquiredToken, AcquireError> {
        let credential = self.credential.kind();
        info!(client_id = %self.client_id, tenant_id, credential, "Requesting service principal token");

        let issued_at = unix_now().map_err(|e| AcquireError::ServicePrincipalToken {
            credential,
            message: e.to_string(),
        })?;

        let response = self
            .request_token(cancel, tenant_id, scopes, None)
            .await
            .map_err(|e| match e {
                RequestError::Cancelled => AcquireError::Cancelled,
                RequestError::Failed(message) => {
                    AcquireError::ServicePrincipalToken { credential, message }
                }
            })?;

        let expires_on = response
            .expires_on(issued_at)
            .map_err(|message| AcquireError::ServicePrincipalToken { credential, message })?;

        info!(expires_on, "Acquired service principal token");
        Ok(AcquiredToken {
            token: response.access_token,
            expires_on,
        })
    }
}

/// Produce the request's signing key without blocking the runtime
pub async fn get_key(
    cancel: &CancellationToken,
    key_provider: &KeyProvider,
) -> Result<Arc<dyn PopKey>, AcquireError> {
    let provider = key_provider.clone();
    let task = tokio::task::spawn_blocking(move || provider.load_key());

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AcquireError::Cancelled),
        joined = task => match joined {
            Ok(key) => key.map_err(AcquireError::PoPTokenAcquisition),
            Err(e) => Err(AcquireError::PoPTokenAcquisition(PopError::KeyUnavailable(
                format!("key provider task failed: {e}"),
            ))),
        },
    }
}

/// Sign on a blocking thread; hardware stores may take a while
async fn sign_token(
    cancel: &CancellationToken,
    confirmation: PopConfirmation,
    access_token: String,
) -> Result<String, AcquireError> {
    let task = tokio::task::spawn_blocking(move || confirmation.sign(&access_token));

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AcquireError::Cancelled),
        joined = task => match joined {
            Ok(token) => token.map_err(AcquireError::PoPTokenAcquisition),
            Err(e) => Err(AcquireError::PoPTokenAcquisition(PopError::Signing(
                format!("signing task failed: {e}"),
            ))),
        },
    }
}

/// Exchange `client`'s credential and `claims` for a PoP token
///
/// Steps run in order: key, confirmation, token request, signing,
/// validation. Each call uses its own key and confirmation.
pub async fn acquire_pop_token_confidential(
    cancel: &CancellationToken,
    claims: &ClaimSet,
    scopes: &[String],
    client: &ConfidentialClient,
    tenant_id: &str,
    key_provider: &KeyProvider,
) -> Result<AcquiredToken, AcquireError> {
    let credential = client.credential.kind();
    info!(
        client_id = %client.client_id,
        tenant_id,
        credential,
        hardware_key = key_provider.is_hardware(),
        "Requesting service principal PoP token"
    );

    let key = get_key(cancel, key_provider).await?;
    let issued_at = unix_now().map_err(AcquireError::PoPTokenAcquisition)?;
    let confirmation =
        build_confirmation(claims, key, issued_at).map_err(AcquireError::PoPTokenAcquisition)?;
    debug!(kid = %confirmation.thumbprint(), "Built PoP confirmation");

    let response = client
        .request_token(cancel, tenant_id, scopes, Some(confirmation.req_cnf()))
        .await
        .map_err(|e| match e {
            RequestError::Cancelled => AcquireError::Cancelled,
            RequestError::Failed(message) => {
                warn!(credential, "PoP token request rejected");
                AcquireError::ServicePrincipalPoPToken { credential, message }
            }
        })?;

    if response.token_type != POP_TOKEN_TYPE {
        return Err(AcquireError::ServicePrincipalPoPToken {
            credential,
            message: format!(
                "identity provider returned token type {:?}, expected a pop token",
                response.token_type
            ),
        });
    }

    let expires_on = response
        .expires_on(issued_at)
        .map_err(|message| AcquireError::ServicePrincipalPoPToken { credential, message })?;

    let token = sign_token(cancel, confirmation, response.access_token).await?;
    validate_token_response(&token).map_err(AcquireError::InvalidPoPToken)?;

    info!(expires_on, "Acquired service principal PoP token");
    Ok(AcquiredToken { token, expires_on })
}
