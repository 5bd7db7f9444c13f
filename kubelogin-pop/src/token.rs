//! Token acquisition entry point

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::exchange::{AcquireError, AcquiredToken, ConfidentialClient};
use crate::options::{ConfigError, LoginMethod, Options};

/// Acquire a token as described by validated `options`
///
/// PoP-enabled options yield a signed PoP token, others a bearer token.
pub async fn get_token(
    options: &Options,
    cancel: &CancellationToken,
) -> Result<AcquiredToken, AcquireError> {
    let method = options.login_method()?;
    if method != LoginMethod::ServicePrincipal {
        return Err(ConfigError::LoginMethodUnavailable(method).into());
    }
    if options.tenant_id.is_empty() {
        return Err(ConfigError::MissingValue("tenant ID", method).into());
    }
    if options.server_id.is_empty() {
        return Err(ConfigError::MissingValue("server ID", method).into());
    }

    let client = ConfidentialClient::from_options(options)?;
    let scopes = options.scopes();

    match options.pop_claims()? {
        Some(claims) => {
            let key_provider = options.key_provider();
            debug!(?key_provider, claims = %claims, "Using PoP token flow");
            client
                .acquire_pop_token(cancel, &claims, &scopes, &options.tenant_id, &key_provider)
                .await
        }
        None => client.acquire_token(cancel, &scopes, &options.tenant_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oauth_pop::validate_token_response;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spn_options(server: &MockServer) -> Options {
        Options {
            login_method: "spn".to_string(),
            client_id: "client-id".to_string(),
            client_secret: "s3cret".to_string(),
            tenant_id: "tenant-id".to_string(),
            server_id: "6dae42f8-4368-4678-94ff-3960e28e3630".to_string(),
            authority_host: format!("{}/", server.uri()),
            disable_instance_discovery: true,
            ..Options::new()
        }
    }

    #[tokio::test]
    async fn test_pop_flow_from_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-id/oauth2/v2.0/token"))
            .and(body_string_contains("token_type=pop"))
            .and(body_string_contains(
                "scope=6dae42f8-4368-4678-94ff-3960e28e3630%2F.default",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "pop",
                "access_token": "issued",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        let mut options = Options {
            is_pop_token_enabled: true,
            pop_token_claims: "u=testhost".to_string(),
            ..spn_options(&server)
        };
        options.validate().unwrap();

        let acquired = get_token(&options, &CancellationToken::new()).await.unwrap();
        assert_eq!(validate_token_response(&acquired.token).unwrap(), "issued");
    }

    #[tokio::test]
    async fn test_bearer_flow_from_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "access_token": "plain",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        let mut options = spn_options(&server);
        options.validate().unwrap();

        let acquired = get_token(&options, &CancellationToken::new()).await.unwrap();
        assert_eq!(acquired.token, "plain");
    }

    #[tokio::test]
    async fn test_other_login_methods_unavailable() {
        let options = Options::new();

        let err = get_token(&options, &CancellationToken::new()).await.unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("devicecode is not available"));
    }

    #[tokio::test]
    async fn test_missing_tenant() {
        let server = MockServer::start().await;
        let options = Options {
            tenant_id: String::new(),
            ..spn_options(&server)
        };

        let err = get_token(&options, &CancellationToken::new()).await.unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("tenant ID is required"));
    }
}
