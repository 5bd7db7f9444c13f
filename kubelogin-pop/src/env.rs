//! Environment variables that can populate [`Options`](crate::options::Options)
//!
//! Three naming schemes are recognised. Each is an ordered table of
//! `(variable, field)` bindings; later bindings win when several are set.

pub const LOGIN_METHOD: &str = "AAD_LOGIN_METHOD";

pub const KUBELOGIN_CLIENT_ID: &str = "AAD_SERVICE_PRINCIPAL_CLIENT_ID";
pub const KUBELOGIN_CLIENT_SECRET: &str = "AAD_SERVICE_PRINCIPAL_CLIENT_SECRET";
pub const KUBELOGIN_CLIENT_CERTIFICATE_PATH: &str = "AAD_SERVICE_PRINCIPAL_CLIENT_CERTIFICATE";
pub const KUBELOGIN_CLIENT_CERTIFICATE_PASSWORD: &str =
    "AAD_SERVICE_PRINCIPAL_CLIENT_CERTIFICATE_PASSWORD";
pub const KUBELOGIN_ROPC_USERNAME: &str = "AAD_USER_PRINCIPAL_NAME";
pub const KUBELOGIN_ROPC_PASSWORD: &str = "AAD_USER_PRINCIPAL_PASSWORD";

pub const TERRAFORM_CLIENT_ID: &str = "ARM_CLIENT_ID";
pub const TERRAFORM_CLIENT_SECRET: &str = "ARM_CLIENT_SECRET";
pub const TERRAFORM_CLIENT_CERTIFICATE_PATH: &str = "ARM_CLIENT_CERTIFICATE_PATH";
pub const TERRAFORM_CLIENT_CERTIFICATE_PASSWORD: &str = "ARM_CLIENT_CERTIFICATE_PASSWORD";
pub const TERRAFORM_TENANT_ID: &str = "ARM_TENANT_ID";

pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const AZURE_CLIENT_CERTIFICATE_PATH: &str = "AZURE_CLIENT_CERTIFICATE_PATH";
pub const AZURE_CLIENT_CERTIFICATE_PASSWORD: &str = "AZURE_CLIENT_CERTIFICATE_PASSWORD";
pub const AZURE_USERNAME: &str = "AZURE_USERNAME";
pub const AZURE_PASSWORD: &str = "AZURE_PASSWORD";
pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";
pub const AZURE_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";

/// Option field an environment variable writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ClientId,
    ClientSecret,
    ClientCert,
    ClientCertPassword,
    Username,
    Password,
    TenantId,
    FederatedTokenFile,
    AuthorityHost,
}

pub type Binding = (&'static str, Field);

/// Kubelogin's own variables, overridden by the Azure SDK ones
pub const LEGACY_BINDINGS: &[Binding] = &[
    (KUBELOGIN_CLIENT_ID, Field::ClientId),
    (KUBELOGIN_CLIENT_SECRET, Field::ClientSecret),
    (KUBELOGIN_CLIENT_CERTIFICATE_PATH, Field::ClientCert),
    (KUBELOGIN_CLIENT_CERTIFICATE_PASSWORD, Field::ClientCertPassword),
    (KUBELOGIN_ROPC_USERNAME, Field::Username),
    (KUBELOGIN_ROPC_PASSWORD, Field::Password),
];

pub const AZURE_SDK_BINDINGS: &[Binding] = &[
    (AZURE_CLIENT_ID, Field::ClientId),
    (AZURE_CLIENT_SECRET, Field::ClientSecret),
    (AZURE_CLIENT_CERTIFICATE_PATH, Field::ClientCert),
    (AZURE_CLIENT_CERTIFICATE_PASSWORD, Field::ClientCertPassword),
    (AZURE_USERNAME, Field::Username),
    (AZURE_PASSWORD, Field::Password),
    (AZURE_TENANT_ID, Field::TenantId),
    (AZURE_FEDERATED_TOKEN_FILE, Field::FederatedTokenFile),
    (AZURE_AUTHORITY_HOST, Field::AuthorityHost),
];

/// Used instead of the two tables above when Terraform variables are enabled
pub const TERRAFORM_BINDINGS: &[Binding] = &[
    (TERRAFORM_CLIENT_ID, Field::ClientId),
    (TERRAFORM_CLIENT_SECRET, Field::ClientSecret),
    (TERRAFORM_CLIENT_CERTIFICATE_PATH, Field::ClientCert),
    (TERRAFORM_CLIENT_CERTIFICATE_PASSWORD, Field::ClientCertPassword),
    (TERRAFORM_TENANT_ID, Field::TenantId),
];

/// Bindings to apply, in order
pub fn bindings(use_terraform: bool) -> Vec<Binding> {
    if use_terraform {
        TERRAFORM_BINDINGS.to_vec()
    } else {
        LEGACY_BINDINGS
            .iter()
            .chain(AZURE_SDK_BINDINGS)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azure_sdk_bindings_follow_legacy() {
        let order = bindings(false);
        let legacy = order
            .iter()
            .position(|(var, _)| *var == KUBELOGIN_CLIENT_ID)
            .unwrap();
        let sdk = order
            .iter()
            .position(|(var, _)| *var == AZURE_CLIENT_ID)
            .unwrap();

        assert!(legacy < sdk);
    }

    #[test]
    fn test_terraform_bindings_are_exclusive() {
        let order = bindings(true);
        assert!(order.iter().all(|(var, _)| var.starts_with("ARM_")));
    }
}
