//! Client-credentials resolution against the cloud authority.

use super::authorizer::{AccessToken, Authorizer, TokenSource};
use super::cloud::CredentialConfig;
use crate::config::DEFAULT_AUTH_TIMEOUT_SECS;
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Turns a credential configuration into a ready-to-use authorizer.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, config: &Arc<CredentialConfig>) -> ProviderResult<Authorizer>;
}

/// OAuth2 token response from the authority.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[allow(dead_code)]
    token_type: String,
}

/// OAuth2 error body, e.g. `{"error":"invalid_client","error_description":"..."}`.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Token source for the service principal client-credentials flow.
#[derive(Debug)]
struct ServicePrincipalTokenSource {
    config: Arc<CredentialConfig>,
    http_client: reqwest::Client,
    request_timeout: std::time::Duration,
}

#[async_trait]
impl TokenSource for ServicePrincipalTokenSource {
    #[instrument(skip(self), fields(tenant_id = %self.config.tenant_id()))]
    async fn fetch_token(&self) -> ProviderResult<AccessToken> {
        let environment = self.config.environment();
        let token_url = environment.token_url(self.config.tenant_id());
        let scope = environment.resource_manager_scope();

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret().expose_secret()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http_client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::timeout("token request", self.request_timeout.as_secs())
                } else {
                    ProviderError::from(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(ProviderError::auth(
                format!("Token request failed with status {}: {}", status, detail),
                "Verify ARM_CLIENT_ID, ARM_CLIENT_SECRET and ARM_TENANT_ID",
            ));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            ProviderError::auth(
                format!("Failed to parse token response: {}", e),
                "Check that the authority endpoint is correct",
            )
        })?;

        let expires_at = expiry_after(token_response.expires_in)?;
        debug!(
            "Acquired new token, expires at {}",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(AccessToken::new(
            SecretString::from(token_response.access_token),
            expires_at,
        ))
    }
}

/// Absolute expiry for a token that lives `expires_in` seconds from now.
fn expiry_after(expires_in: i64) -> ProviderResult<DateTime<Utc>> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| {
            ProviderError::auth(
                format!("Token response has an unusable expires_in of {}", expires_in),
                "Check that the authority endpoint is correct",
            )
        })
}

/// Resolves authorizers with the service principal client-credentials grant.
#[derive(Debug, Clone)]
pub struct ServicePrincipalResolver {
    http_client: Option<reqwest::Client>,
    timeout: std::time::Duration,
}

impl ServicePrincipalResolver {
    pub fn new() -> Self {
        Self::with_timeout(std::time::Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS))
    }

    /// Bound every token request made by the authorizers this resolver builds.
    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        Self {
            http_client: None,
            timeout,
        }
    }

    /// Use a preconfigured HTTP client instead of building one per resolution.
    ///
    /// The client's own timeout applies; set one on the builder.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self {
            http_client: Some(http_client),
            ..Self::new()
        }
    }

    fn client_for(&self, config: &CredentialConfig) -> ProviderResult<reqwest::Client> {
        if let Some(client) = &self.http_client {
            return Ok(client.clone());
        }
        reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to build HTTP client: {}", e)))
    }
}

impl Default for ServicePrincipalResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialResolver for ServicePrincipalResolver {
    async fn resolve(&self, config: &Arc<CredentialConfig>) -> ProviderResult<Authorizer> {
        for (name, value) in [
            ("client ID", config.client_id()),
            ("client secret", config.client_secret().expose_secret()),
            ("tenant ID", config.tenant_id()),
        ] {
            if value.trim().is_empty() {
                return Err(ProviderError::config(format!(
                    "Service principal {} must not be empty",
                    name
                )));
            }
        }

        let source = Arc::new(ServicePrincipalTokenSource {
            config: Arc::clone(config),
            http_client: self.client_for(config)?,
            request_timeout: self.timeout,
        });
        let initial = source.fetch_token().await?;
        Ok(Authorizer::new(source, initial))
    }
}
