//! Configuration handling for the SQL plugin provider.
//!
//! This module provides configuration via CLI arguments and environment variables.
//! Credential variables follow the `ARM_*` names used by Azure tooling.

use crate::auth::{CloudEnvironment, CredentialConfig};
use crate::error::{ProviderError, ProviderResult};
use clap::Args;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CLOUD_NAME: &str = "AzurePublicCloud";
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 30;

// Host operation deadlines
pub const DEFAULT_CREATE_TIMEOUT_SECS: u64 = 60 * 60;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5 * 60;
pub const DEFAULT_UPDATE_TIMEOUT_SECS: u64 = 60 * 60;
pub const DEFAULT_DELETE_TIMEOUT_SECS: u64 = 60 * 60;

// Pool defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Deadlines applied to each lifecycle phase as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
    pub authorize: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(DEFAULT_CREATE_TIMEOUT_SECS),
            read: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            update: Duration::from_secs(DEFAULT_UPDATE_TIMEOUT_SECS),
            delete: Duration::from_secs(DEFAULT_DELETE_TIMEOUT_SECS),
            authorize: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
        }
    }
}

/// Configuration for the provider.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Service principal client (application) ID
    #[arg(long, env = "ARM_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Service principal client secret
    #[arg(long, env = "ARM_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Azure Active Directory tenant ID
    #[arg(long, env = "ARM_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Azure subscription ID
    #[arg(long, env = "ARM_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Cloud environment name (AzurePublicCloud, AzureUSGovernmentCloud, AzureChinaCloud)
    #[arg(long, default_value = DEFAULT_CLOUD_NAME, env = "ARM_ENVIRONMENT")]
    pub environment: String,

    /// Liveness probe timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_PROBE_TIMEOUT_SECS,
        env = "SQLPLUGIN_PROBE_TIMEOUT"
    )]
    pub probe_timeout: u64,

    /// Per-statement timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_STATEMENT_TIMEOUT_SECS,
        env = "SQLPLUGIN_STATEMENT_TIMEOUT"
    )]
    pub statement_timeout: u64,

    /// Token request and authorizer resolution timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_AUTH_TIMEOUT_SECS,
        env = "SQLPLUGIN_AUTH_TIMEOUT"
    )]
    pub auth_timeout: u64,

    /// Create deadline in seconds
    #[arg(long, default_value_t = DEFAULT_CREATE_TIMEOUT_SECS, env = "SQLPLUGIN_CREATE_TIMEOUT")]
    pub create_timeout: u64,

    /// Read deadline in seconds
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_SECS, env = "SQLPLUGIN_READ_TIMEOUT")]
    pub read_timeout: u64,

    /// Update deadline in seconds
    #[arg(long, default_value_t = DEFAULT_UPDATE_TIMEOUT_SECS, env = "SQLPLUGIN_UPDATE_TIMEOUT")]
    pub update_timeout: u64,

    /// Delete deadline in seconds
    #[arg(long, default_value_t = DEFAULT_DELETE_TIMEOUT_SECS, env = "SQLPLUGIN_DELETE_TIMEOUT")]
    pub delete_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SQLPLUGIN_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SQLPLUGIN_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            tenant_id: None,
            subscription_id: None,
            environment: DEFAULT_CLOUD_NAME.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT_SECS,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT_SECS,
            auth_timeout: DEFAULT_AUTH_TIMEOUT_SECS,
            create_timeout: DEFAULT_CREATE_TIMEOUT_SECS,
            read_timeout: DEFAULT_READ_TIMEOUT_SECS,
            update_timeout: DEFAULT_UPDATE_TIMEOUT_SECS,
            delete_timeout: DEFAULT_DELETE_TIMEOUT_SECS,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Build the credential configuration, resolving the cloud endpoints eagerly.
    ///
    /// Returns `Ok(None)` when no credential variable is set at all, since
    /// database-only operations never need an authorizer. A partial set is an
    /// error that names the missing variables.
    pub fn credentials(&self) -> ProviderResult<Option<Arc<CredentialConfig>>> {
        let fields = [
            ("ARM_CLIENT_ID", &self.client_id),
            ("ARM_CLIENT_SECRET", &self.client_secret),
            ("ARM_TENANT_ID", &self.tenant_id),
            ("ARM_SUBSCRIPTION_ID", &self.subscription_id),
        ];

        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, v)| v.as_deref().is_none_or(|s| s.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();

        if missing.len() == fields.len() {
            return Ok(None);
        }
        if !missing.is_empty() {
            return Err(ProviderError::config(format!(
                "Incomplete service principal credentials, missing: {}",
                missing.join(", ")
            )));
        }

        let environment = CloudEnvironment::from_name(&self.environment)?;
        let config = CredentialConfig::new(
            self.client_id.clone().unwrap_or_default(),
            SecretString::from(self.client_secret.clone().unwrap_or_default()),
            self.tenant_id.clone().unwrap_or_default(),
            self.subscription_id.clone().unwrap_or_default(),
            environment,
        );
        Ok(Some(Arc::new(config)))
    }

    /// Get the liveness probe timeout as a Duration.
    pub fn probe_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    /// Get the per-statement timeout as a Duration.
    pub fn statement_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.statement_timeout)
    }

    pub fn auth_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.auth_timeout)
    }

    pub fn operation_timeouts(&self) -> OperationTimeouts {
        OperationTimeouts {
            create: Duration::from_secs(self.create_timeout),
            read: Duration::from_secs(self.read_timeout),
            update: Duration::from_secs(self.update_timeout),
            delete: Duration::from_secs(self.delete_timeout),
            authorize: self.auth_timeout_duration(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
