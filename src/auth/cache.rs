//! Single-slot authorizer cache owned by a provider configuration.

use super::authorizer::Authorizer;
use super::cloud::CredentialConfig;
use super::resolver::{CredentialResolver, ServicePrincipalResolver};
use crate::config::DEFAULT_AUTH_TIMEOUT_SECS;
use crate::error::{ProviderError, ProviderResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Holds at most one authorizer and resolves a new one on demand.
///
/// The slot lock is held for the whole check-then-fill, so concurrent first
/// callers share a single resolution and all observe the same authorizer.
/// A cached authorizer is returned as is; it refreshes its own token.
/// Resolution is bounded, so a stalled authority releases waiting callers.
pub struct AuthorizerCache {
    resolver: Arc<dyn CredentialResolver>,
    slot: Mutex<Option<Authorizer>>,
    resolve_timeout: Duration,
}

impl AuthorizerCache {
    /// Create a cache backed by the service principal resolver.
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(ServicePrincipalResolver::new()))
    }

    pub fn with_resolver(resolver: Arc<dyn CredentialResolver>) -> Self {
        Self {
            resolver,
            slot: Mutex::new(None),
            resolve_timeout: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
        }
    }

    /// Set the deadline for one resolution.
    pub fn with_timeout(mut self, resolve_timeout: Duration) -> Self {
        self.resolve_timeout = resolve_timeout;
        self
    }

    /// Get the cached authorizer, resolving one if the slot is empty.
    ///
    /// On failure the slot is left empty and the resolver's error is returned
    /// unchanged. A resolution that outlives the deadline is abandoned with a
    /// `Timeout` error, also leaving the slot empty.
    pub async fn get_authorizer(&self, config: &Arc<CredentialConfig>) -> ProviderResult<Authorizer> {
        let mut slot = self.slot.lock().await;
        if let Some(authorizer) = slot.as_ref() {
            debug!("Using cached authorizer");
            return Ok(authorizer.clone());
        }

        let resolved = match timeout(self.resolve_timeout, self.resolver.resolve(config)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(
                "authorize",
                self.resolve_timeout.as_secs(),
            )),
        };

        match resolved {
            Ok(authorizer) => {
                info!(
                    tenant_id = %config.tenant_id(),
                    cloud = %config.environment().name(),
                    "Resolved resource manager authorizer"
                );
                *slot = Some(authorizer.clone());
                Ok(authorizer)
            }
            Err(e) => {
                warn!(error = %e, "Authorizer resolution failed");
                *slot = None;
                Err(e)
            }
        }
    }

    /// Drop the cached authorizer, forcing a resolution on next use.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    pub async fn is_cached(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

impl Default for AuthorizerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuthorizerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizerCache")
            .field("resolve_timeout", &self.resolve_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessToken, CloudEnvironment, TokenSource};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug)]
    struct StaticSource;

    #[async_trait]
    impl TokenSource for StaticSource {
        async fn fetch_token(&self) -> ProviderResult<AccessToken> {
            Ok(AccessToken::new(
                SecretString::from("token".to_string()),
                Utc::now() + Duration::hours(1),
            ))
        }
    }

    /// Counts resolutions; fails while `fail` is set.
    #[derive(Default)]
    struct FakeResolver {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl CredentialResolver for FakeResolver {
        async fn resolve(&self, _config: &Arc<CredentialConfig>) -> ProviderResult<Authorizer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Widen the window in which a second caller could slip in
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProviderError::auth("rejected", "check credentials"));
            }
            let source = Arc::new(StaticSource);
            let token = source.fetch_token().await?;
            Ok(Authorizer::new(source, token))
        }
    }

    fn credentials() -> Arc<CredentialConfig> {
        Arc::new(CredentialConfig::new(
            "client",
            SecretString::from("secret".to_string()),
            "tenant",
            "sub",
            CloudEnvironment::from_name("public").unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_cached_value_is_reused() {
        let resolver = Arc::new(FakeResolver::default());
        let cache = AuthorizerCache::with_resolver(resolver.clone());
        let config = credentials();

        let first = cache.get_authorizer(&config).await.unwrap();
        let second = cache.get_authorizer(&config).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_resolve_once() {
        let resolver = Arc::new(FakeResolver::default());
        let cache = Arc::new(AuthorizerCache::with_resolver(resolver.clone()));
        let config = credentials();

        let (a, b) = tokio::join!(
            {
                let cache = Arc::clone(&cache);
                let config = Arc::clone(&config);
                tokio::spawn(async move { cache.get_authorizer(&config).await })
            },
            {
                let cache = Arc::clone(&cache);
                let config = Arc::clone(&config);
                tokio::spawn(async move { cache.get_authorizer(&config).await })
            }
        );

        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_resolution_leaves_slot_empty() {
        let resolver = Arc::new(FakeResolver::default());
        resolver.fail.store(true, Ordering::SeqCst);
        let cache = AuthorizerCache::with_resolver(resolver.clone());
        let config = credentials();

        let err = cache.get_authorizer(&config).await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth { .. }));
        assert!(!cache.is_cached().await);

        // Recovers once the credentials are accepted again
        resolver.fail.store(false, Ordering::SeqCst);
        cache.get_authorizer(&config).await.unwrap();
        assert!(cache.is_cached().await);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stalled_resolution_times_out_and_stays_empty() {
        let resolver = Arc::new(FakeResolver::default());
        // Shorter than the resolver's own delay
        let cache = AuthorizerCache::with_resolver(resolver.clone())
            .with_timeout(std::time::Duration::from_millis(10));
        let config = credentials();

        let err = cache.get_authorizer(&config).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { ref operation, .. } if operation == "authorize"));
        assert!(!cache.is_cached().await);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_resolution() {
        let resolver = Arc::new(FakeResolver::default());
        let cache = AuthorizerCache::with_resolver(resolver.clone());
        let config = credentials();

        let first = cache.get_authorizer(&config).await.unwrap();
        cache.invalidate().await;
        let second = cache.get_authorizer(&config).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }
}
