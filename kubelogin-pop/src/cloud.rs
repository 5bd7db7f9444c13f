//! Identity provider endpoints per sovereign cloud

use serde::{Deserialize, Serialize};

/// Endpoints of one cloud deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfiguration {
    /// Base URL of the identity provider, always with a trailing slash
    pub authority_host: String,
}

impl CloudConfiguration {
    pub fn new(authority_host: impl Into<String>) -> Self {
        Self {
            authority_host: authority_host.into(),
        }
    }

    /// Public Azure cloud
    pub fn azure_public() -> Self {
        Self::new("https://login.microsoftonline.com/")
    }

    /// Azure US Government
    pub fn azure_government() -> Self {
        Self::new("https://login.microsoftonline.us/")
    }

    /// Azure China (21Vianet)
    pub fn azure_china() -> Self {
        Self::new("https://login.chinacloudapi.cn/")
    }

    /// Resolve a named environment (`AZUREPUBLICCLOUD`, `AZURECHINACLOUD`, ...)
    ///
    /// Names are case-insensitive; unknown or empty names select the public
    /// cloud.
    pub fn from_environment(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "AZURECHINACLOUD" => Self::azure_china(),
            "AZUREUSGOVERNMENT" | "AZUREUSGOVERNMENTCLOUD" => Self::azure_government(),
            _ => Self::azure_public(),
        }
    }

    /// Token endpoint for `tenant_id`
    pub fn token_endpoint(&self, tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            tenant_id
        )
    }

    /// OpenID configuration document for `tenant_id`
    pub fn discovery_endpoint(&self, tenant_id: &str) -> String {
        format!(
            "{}/{}/v2.0/.well-known/openid-configuration",
            self.authority_host.trim_end_matches('/'),
            tenant_id
        )
    }
}

impl Default for CloudConfiguration {
    fn default() -> Self {
        Self::azure_public()
    }
}
