//! Bearer authorizer for the cloud resource-manager API.

use crate::error::ProviderResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Default grace period before expiry that triggers a refresh.
pub const DEFAULT_REFRESH_GRACE_MINUTES: i64 = 5;

/// An OAuth access token and its expiry.
pub struct AccessToken {
    secret: SecretString,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: SecretString, expires_at: DateTime<Utc>) -> Self {
        Self { secret, expires_at }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the token is expired or will expire within the grace period.
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Something that can mint fresh access tokens.
#[async_trait]
pub trait TokenSource: Send + Sync + fmt::Debug {
    async fn fetch_token(&self) -> ProviderResult<AccessToken>;
}

struct AuthorizerInner {
    source: Arc<dyn TokenSource>,
    token: RwLock<AccessToken>,
    grace_period: Duration,
}

/// A bearer credential that refreshes itself from its token source.
///
/// Cloning is cheap and every clone shares the same token. Two authorizers
/// are equal only if they are clones of the same instance.
#[derive(Clone)]
pub struct Authorizer {
    inner: Arc<AuthorizerInner>,
}

impl Authorizer {
    /// Wrap a token source, seeded with an already-acquired token.
    pub fn new(source: Arc<dyn TokenSource>, initial: AccessToken) -> Self {
        Self {
            inner: Arc::new(AuthorizerInner {
                source,
                token: RwLock::new(initial),
                grace_period: Duration::minutes(DEFAULT_REFRESH_GRACE_MINUTES),
            }),
        }
    }

    /// Get a valid bearer token, refreshing it first if it is about to expire.
    pub async fn bearer_token(&self) -> ProviderResult<String> {
        {
            let token = self.inner.token.read().await;
            if !token.is_expired(self.inner.grace_period) {
                return Ok(token.secret.expose_secret().to_string());
            }
        }

        // Write lock held across the fetch so only one refresh runs at a time
        let mut token = self.inner.token.write().await;
        if token.is_expired(self.inner.grace_period) {
            debug!("Refreshing bearer token");
            *token = self.inner.source.fetch_token().await?;
        }
        Ok(token.secret.expose_secret().to_string())
    }

    /// Value for an `Authorization` header.
    pub async fn authorization_header(&self) -> ProviderResult<String> {
        Ok(format!("Bearer {}", self.bearer_token().await?))
    }

    pub async fn expires_at(&self) -> DateTime<Utc> {
        self.inner.token.read().await.expires_at
    }
}

impl PartialEq for Authorizer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Authorizer {}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("source", &self.inner.source)
            .finish_non_exhaustive()
    }
}
