//! Token acquisition options
//!
//! Options come from command-line flags, an optional YAML file and, unless
//! disabled, a fixed overlay of environment variables (see [`crate::env`]).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use oauth_pop::{parse_claims, ClaimSet, ClaimsError, KeyProvider};
use serde::{Deserialize, Serialize};

use crate::cloud::CloudConfiguration;
use crate::env::{self, Field};
use crate::keystore::KeychainKeyStore;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// File name of the authentication record inside the cache directory
pub const AUTH_RECORD_FILE_NAME: &str = "auth.json";

/// Supported login methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethod {
    DeviceCode,
    Interactive,
    ServicePrincipal,
    ResourceOwnerPassword,
    ManagedIdentity,
    AzureCli,
    AzureDeveloperCli,
    WorkloadIdentity,
}

impl LoginMethod {
    pub const ALL: [LoginMethod; 8] = [
        LoginMethod::DeviceCode,
        LoginMethod::Interactive,
        LoginMethod::ServicePrincipal,
        LoginMethod::ResourceOwnerPassword,
        LoginMethod::ManagedIdentity,
        LoginMethod::AzureCli,
        LoginMethod::AzureDeveloperCli,
        LoginMethod::WorkloadIdentity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::DeviceCode => "devicecode",
            LoginMethod::Interactive => "interactive",
            LoginMethod::ServicePrincipal => "spn",
            LoginMethod::ResourceOwnerPassword => "ropc",
            LoginMethod::ManagedIdentity => "msi",
            LoginMethod::AzureCli => "azurecli",
            LoginMethod::AzureDeveloperCli => "azd",
            LoginMethod::WorkloadIdentity => "workloadidentity",
        }
    }

    fn supported_list() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(LoginMethod::as_str).collect();
        names.join(", ")
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ConfigError::UnsupportedLoginMethod {
                method: s.to_string(),
                supported: Self::supported_list(),
            })
    }
}

/// Where the PoP signing key comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// Fresh in-memory key per request
    #[default]
    Software,
    /// Pre-provisioned key in the OS keychain
    Keychain,
}

/// Options for one token acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub login_method: String,
    pub client_id: String,
    pub client_secret: String,
    /// Path to a PEM file holding the client certificate and private key
    pub client_cert: String,
    pub client_cert_password: String,
    pub username: String,
    pub password: String,
    pub tenant_id: String,
    /// Application ID of the API server; scopes are derived from it
    pub server_id: String,
    /// Named cloud (`AZUREPUBLICCLOUD`, `AZURECHINACLOUD`, ...)
    pub environment: String,
    /// Overrides the cloud's authority host; must end with `/`
    pub authority_host: String,
    pub federated_token_file: String,
    #[serde(with = "timeout_secs")]
    pub timeout: Duration,
    #[serde(rename = "pop_enabled")]
    pub is_pop_token_enabled: bool,
    #[serde(rename = "pop_claims")]
    pub pop_token_claims: String,
    pub pop_key_source: KeySource,
    pub use_azurerm_terraform_env: bool,
    pub disable_environment_override: bool,
    pub disable_instance_discovery: bool,
    pub auth_record_cache_dir: PathBuf,
    #[serde(skip)]
    pub(crate) auth_record_cache_file: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    pub fn new() -> Self {
        Self {
            login_method: LoginMethod::DeviceCode.as_str().to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            client_cert: String::new(),
            client_cert_password: String::new(),
            username: String::new(),
            password: String::new(),
            tenant_id: String::new(),
            server_id: String::new(),
            environment: String::new(),
            authority_host: String::new(),
            federated_token_file: String::new(),
            timeout: DEFAULT_TIMEOUT,
            is_pop_token_enabled: false,
            pop_token_claims: String::new(),
            pop_key_source: KeySource::Software,
            use_azurerm_terraform_env: false,
            disable_environment_override: false,
            disable_instance_discovery: false,
            auth_record_cache_dir: default_auth_record_cache_dir(),
            auth_record_cache_file: None,
        }
    }

    /// Load options from a YAML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let options: Self = serde_yaml::from_str(&content)?;
        Ok(options)
    }

    /// Overlay values from the process environment
    pub fn update_from_env(&mut self) {
        self.auth_record_cache_file = Some(self.auth_record_cache_dir.join(AUTH_RECORD_FILE_NAME));

        if self.disable_environment_override {
            return;
        }

        for (var, field) in env::bindings(self.use_azurerm_terraform_env) {
            if let Ok(value) = std::env::var(var) {
                *self.field_mut(field) = value;
            }
        }

        if let Ok(method) = std::env::var(env::LOGIN_METHOD) {
            self.login_method = method;
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::ClientId => &mut self.client_id,
            Field::ClientSecret => &mut self.client_secret,
            Field::ClientCert => &mut self.client_cert,
            Field::ClientCertPassword => &mut self.client_cert_password,
            Field::Username => &mut self.username,
            Field::Password => &mut self.password,
            Field::TenantId => &mut self.tenant_id,
            Field::FederatedTokenFile => &mut self.federated_token_file,
            Field::AuthorityHost => &mut self.authority_host,
        }
    }

    /// Check the options for consistency
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.login_method()?;

        self.auth_record_cache_file = Some(self.auth_record_cache_dir.join(AUTH_RECORD_FILE_NAME));

        if self.is_pop_token_enabled && self.pop_token_claims.is_empty() {
            return Err(ConfigError::MissingPopClaims);
        }
        if !self.is_pop_token_enabled && !self.pop_token_claims.is_empty() {
            return Err(ConfigError::PopNotEnabled);
        }
        if self.is_pop_token_enabled {
            parse_claims(&self.pop_token_claims)?;
        }

        if !self.authority_host.is_empty() && !is_valid_authority_host(&self.authority_host) {
            return Err(ConfigError::InvalidAuthorityHost {
                host: self.authority_host.clone(),
            });
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(())
    }

    pub fn login_method(&self) -> Result<LoginMethod, ConfigError> {
        self.login_method.parse()
    }

    /// Cloud endpoints; an explicit authority host wins over the named environment
    pub fn cloud_configuration(&self) -> CloudConfiguration {
        if self.authority_host.is_empty() {
            CloudConfiguration::from_environment(&self.environment)
        } else {
            CloudConfiguration::new(self.authority_host.clone())
        }
    }

    /// Location of the authentication record, known after env overlay or validation
    pub fn auth_record_cache_file(&self) -> Option<&Path> {
        self.auth_record_cache_file.as_deref()
    }

    /// Scopes requested for the API server
    pub fn scopes(&self) -> Vec<String> {
        vec![format!("{}/.default", self.server_id)]
    }

    /// Parsed PoP claims, `None` when PoP is disabled
    pub fn pop_claims(&self) -> Result<Option<ClaimSet>, ConfigError> {
        if !self.is_pop_token_enabled {
            return Ok(None);
        }
        Ok(Some(parse_claims(&self.pop_token_claims)?))
    }

    pub fn key_provider(&self) -> KeyProvider {
        match self.pop_key_source {
            KeySource::Software => KeyProvider::Software,
            KeySource::Keychain => KeyProvider::Hardware(Arc::new(KeychainKeyStore::default())),
        }
    }
}

fn default_auth_record_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("~"))
        .join(".kube")
        .join("cache")
        .join("kubelogin")
}

fn is_valid_authority_host(host: &str) -> bool {
    // The url crate normalizes an empty path to "/", so check the raw input
    if !host.ends_with('/') {
        return false;
    }
    match url::Url::parse(host) {
        Ok(url) => url.has_host() && matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

mod timeout_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(timeout.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("'{method}' is not a supported login method. Supported method is one of {supported}")]
    UnsupportedLoginMethod { method: String, supported: String },
    #[error("please provide the pop-claims flag if you want to use pop token")]
    MissingPopClaims,
    #[error("pop-enabled flag is required to use the PoP token feature. Please provide both pop-enabled and pop-claims flags")]
    PopNotEnabled,
    #[error("authority host {host:?} is not valid. Valid authority host should end with /")]
    InvalidAuthorityHost { host: String },
    #[error("timeout must be greater than 0")]
    InvalidTimeout,
    #[error("login method {0} is not available in this build, use spn")]
    LoginMethodUnavailable(LoginMethod),
    #[error("{0} is required for login method {1}")]
    MissingValue(&'static str, LoginMethod),
    #[error("invalid client credential: {0}")]
    InvalidCredential(String),
    #[error(transparent)]
    Claims(#[from] ClaimsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
