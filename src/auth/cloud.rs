//! Cloud endpoint sets and service principal credentials.

use crate::error::{ProviderError, ProviderResult};
use secrecy::SecretString;

/// Authority and resource-manager endpoints for one cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEnvironment {
    name: String,
    active_directory_endpoint: String,
    resource_manager_endpoint: String,
}

impl CloudEnvironment {
    /// Resolve a well-known cloud by name.
    ///
    /// Accepts the full names (`AzurePublicCloud`, ...) as well as the short
    /// aliases `public`, `usgovernment` and `china`, case-insensitively.
    pub fn from_name(name: &str) -> ProviderResult<Self> {
        let (canonical, authority, resource_manager) = match name.trim().to_ascii_lowercase().as_str()
        {
            "azurepubliccloud" | "public" => (
                "AzurePublicCloud",
                "https://login.microsoftonline.com/",
                "https://management.azure.com/",
            ),
            "azureusgovernmentcloud" | "usgovernment" => (
                "AzureUSGovernmentCloud",
                "https://login.microsoftonline.us/",
                "https://management.usgovcloudapi.net/",
            ),
            "azurechinacloud" | "china" => (
                "AzureChinaCloud",
                "https://login.chinacloudapi.cn/",
                "https://management.chinacloudapi.cn/",
            ),
            _ => {
                return Err(ProviderError::config(format!(
                    "Invalid cloud name '{}' specified, cannot continue",
                    name
                )));
            }
        };
        Ok(Self::custom(canonical, authority, resource_manager))
    }

    /// Build an endpoint set explicitly, e.g. for a private authority.
    pub fn custom(
        name: impl Into<String>,
        active_directory_endpoint: impl Into<String>,
        resource_manager_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            active_directory_endpoint: active_directory_endpoint.into(),
            resource_manager_endpoint: resource_manager_endpoint.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active_directory_endpoint(&self) -> &str {
        &self.active_directory_endpoint
    }

    pub fn resource_manager_endpoint(&self) -> &str {
        &self.resource_manager_endpoint
    }

    /// Token endpoint of the authority for a tenant.
    pub fn token_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.active_directory_endpoint.trim_end_matches('/'),
            tenant_id
        )
    }

    /// OAuth scope for the resource-manager audience.
    pub fn resource_manager_scope(&self) -> String {
        format!(
            "{}/.default",
            self.resource_manager_endpoint.trim_end_matches('/')
        )
    }
}

/// Service principal credentials plus the resolved cloud endpoints.
///
/// Immutable once built; shared behind an `Arc` by the resolver and the
/// authorizers it produces.
#[derive(Debug)]
pub struct CredentialConfig {
    client_id: String,
    client_secret: SecretString,
    tenant_id: String,
    subscription_id: String,
    environment: CloudEnvironment,
}

impl CredentialConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        tenant_id: impl Into<String>,
        subscription_id: impl Into<String>,
        environment: CloudEnvironment,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            tenant_id: tenant_id.into(),
            subscription_id: subscription_id.into(),
            environment,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn environment(&self) -> &CloudEnvironment {
        &self.environment
    }

    pub fn user_agent(&self) -> String {
        format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}
