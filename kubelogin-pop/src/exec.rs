//! client-go exec plugin output

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Variable client-go uses to pass the exec request to the plugin
pub const EXEC_INFO_ENV: &str = "KUBERNETES_EXEC_INFO";

pub const API_VERSION_V1BETA1: &str = "client.authentication.k8s.io/v1beta1";
pub const API_VERSION_V1: &str = "client.authentication.k8s.io/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredential {
    pub kind: String,
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ExecCredentialSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecCredentialStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredentialSpec {
    #[serde(default)]
    pub interactive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredentialStatus {
    /// RFC 3339 timestamp
    pub expiration_timestamp: String,
    pub token: String,
}

impl ExecCredential {
    /// Credential carrying `token`, valid until `expires_on` (Unix seconds)
    pub fn new(api_version: &str, token: String, expires_on: i64) -> Self {
        let expiration = DateTime::<Utc>::from_timestamp(expires_on, 0).unwrap_or_default();

        Self {
            kind: "ExecCredential".to_string(),
            api_version: api_version.to_string(),
            spec: Some(ExecCredentialSpec::default()),
            status: Some(ExecCredentialStatus {
                expiration_timestamp: expiration.to_rfc3339_opts(SecondsFormat::Secs, true),
                token,
            }),
        }
    }
}

/// API version requested by client-go, defaulting to v1beta1
///
/// `exec_info` is the raw value of [`EXEC_INFO_ENV`]; unparsable or
/// unknown versions fall back to the default.
pub fn requested_api_version(exec_info: Option<&str>) -> &'static str {
    let requested = exec_info
        .and_then(|raw| serde_json::from_str::<ExecCredential>(raw).ok())
        .map(|info| info.api_version);

    match requested.as_deref() {
        Some(API_VERSION_V1) => API_VERSION_V1,
        _ => API_VERSION_V1BETA1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_credential_json() {
        let cred = ExecCredential::new(API_VERSION_V1BETA1, "tok".to_string(), 1_700_000_000);
        let json = serde_json::to_value(&cred).unwrap();

        assert_eq!(json["kind"], "ExecCredential");
        assert_eq!(json["apiVersion"], API_VERSION_V1BETA1);
        assert_eq!(json["spec"]["interactive"], false);
        assert_eq!(json["status"]["token"], "tok");
        assert_eq!(
            json["status"]["expirationTimestamp"],
            "2023-11-14T22:13:20Z"
        );
    }

    #[test]
    fn test_requested_api_version() {
        let v1 = r#"{"kind":"ExecCredential","apiVersion":"client.authentication.k8s.io/v1","spec":{"interactive":true}}"#;
        let beta = r#"{"kind":"ExecCredential","apiVersion":"client.authentication.k8s.io/v1beta1"}"#;

        assert_eq!(requested_api_version(Some(v1)), API_VERSION_V1);
        assert_eq!(requested_api_version(Some(beta)), API_VERSION_V1BETA1);
        assert_eq!(requested_api_version(Some("not json")), API_VERSION_V1BETA1);
        assert_eq!(requested_api_version(None), API_VERSION_V1BETA1);
    }
}
