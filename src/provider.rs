//! The `sqlplugin_mssql_employee` resource provider.
//!
//! [`SqlPluginProvider`] owns everything one provider configuration needs:
//! the credential configuration, the authorizer cache, the connection manager
//! and the reconciliation engine. Its lifecycle methods take and return the
//! host's state documents as JSON objects.
//!
//! Once create has assigned an `id`, the ID-keyed statements are used for
//! every later phase. The name/location statements are only a fallback for
//! state that has no `id` yet.

use crate::auth::{Authorizer, AuthorizerCache, CredentialConfig, ServicePrincipalResolver};
use crate::config::{Config, OperationTimeouts};
use crate::db::{ConnectionManager, DbPool, ReconciliationEngine};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{ConnectionDescriptor, DatabaseType};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Resource type name registered with the host.
pub const RESOURCE_TYPE: &str = "sqlplugin_mssql_employee";

/// Attributes read from the host's declared state.
#[derive(Debug, Deserialize)]
struct EmployeeAttributes {
    #[serde(default, deserialize_with = "string_or_number")]
    id: Option<String>,
    name: String,
    location: String,
    server: String,
    #[serde(default, deserialize_with = "string_or_number")]
    port: Option<String>,
    #[serde(default)]
    database_name: String,
    #[serde(default)]
    admin_user: String,
    #[serde(default)]
    admin_password: String,
    #[serde(default)]
    dialect: Option<String>,
}

impl EmployeeAttributes {
    fn from_state(state: &Value) -> ProviderResult<Self> {
        Self::deserialize(state)
            .map_err(|e| ProviderError::invalid_input(format!("Invalid resource state: {}", e)))
    }

    fn id(&self) -> ProviderResult<Option<i64>> {
        match self.id.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| {
                ProviderError::invalid_input(format!("Resource id '{}' is not an integer", raw))
            }),
        }
    }

    fn descriptor(&self) -> ProviderResult<ConnectionDescriptor> {
        let dialect = match self.dialect.as_deref() {
            None | Some("") => DatabaseType::default(),
            Some(name) => DatabaseType::from_name(name).ok_or_else(|| {
                ProviderError::invalid_input(format!(
                    "Unsupported dialect '{}'; expected mssql, postgresql, mysql or sqlite",
                    name
                ))
            })?,
        };
        ConnectionDescriptor::new(
            dialect,
            self.server.as_str(),
            self.port.as_deref().unwrap_or_default(),
            self.database_name.as_str(),
            self.admin_user.as_str(),
            SecretString::from(self.admin_password.clone()),
        )
    }
}

/// Accept a JSON string or number, e.g. `"port": 1433` as well as `"1433"`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

fn state_object(state: &mut Value) -> ProviderResult<&mut serde_json::Map<String, Value>> {
    state
        .as_object_mut()
        .ok_or_else(|| ProviderError::invalid_input("Resource state must be a JSON object"))
}

fn set_attribute(state: &mut Value, key: &str, value: Value) -> ProviderResult<()> {
    state_object(state)?.insert(key.to_string(), value);
    Ok(())
}

fn set_id(state: &mut Value, id: i64) -> ProviderResult<()> {
    set_attribute(state, "id", Value::String(id.to_string()))
}

fn clear_id(state: &mut Value) -> ProviderResult<()> {
    state_object(state)?.remove("id");
    Ok(())
}

/// Run a whole lifecycle phase under the host's deadline for it.
async fn with_deadline<T>(
    operation: &str,
    limit: Duration,
    fut: impl Future<Output = ProviderResult<T>>,
) -> ProviderResult<T> {
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_secs = limit.as_secs(), "Operation deadline exceeded");
            Err(ProviderError::timeout(operation, limit.as_secs()))
        }
    }
}

/// Provider for the employee resource.
pub struct SqlPluginProvider {
    credentials: Option<Arc<CredentialConfig>>,
    authorizers: AuthorizerCache,
    connections: ConnectionManager,
    engine: ReconciliationEngine,
    timeouts: OperationTimeouts,
}

impl SqlPluginProvider {
    /// Configure a provider from CLI/env configuration.
    ///
    /// Credential and cloud resolution happen here, once; an unknown cloud
    /// name fails configuration rather than any later operation.
    pub fn configure(config: &Config) -> ProviderResult<Self> {
        let credentials = config.credentials()?;
        let probe_timeout = config.probe_timeout_duration();

        info!(
            cloud = %config.environment,
            has_credentials = credentials.is_some(),
            "Configuring provider"
        );

        let auth_timeout = config.auth_timeout_duration();
        let authorizers = AuthorizerCache::with_resolver(Arc::new(
            ServicePrincipalResolver::with_timeout(auth_timeout),
        ))
        .with_timeout(auth_timeout);

        Ok(Self::new(
            credentials,
            ConnectionManager::new(probe_timeout),
            ReconciliationEngine::with_timeouts(
                probe_timeout,
                config.statement_timeout_duration(),
            ),
            config.operation_timeouts(),
        )
        .with_authorizer_cache(authorizers))
    }

    pub fn new(
        credentials: Option<Arc<CredentialConfig>>,
        connections: ConnectionManager,
        engine: ReconciliationEngine,
        timeouts: OperationTimeouts,
    ) -> Self {
        Self {
            credentials,
            authorizers: AuthorizerCache::new(),
            connections,
            engine,
            timeouts,
        }
    }

    /// Replace the authorizer cache, e.g. to inject a different resolver.
    pub fn with_authorizer_cache(mut self, authorizers: AuthorizerCache) -> Self {
        self.authorizers = authorizers;
        self
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Get the authorizer for resource-manager API calls.
    pub async fn resource_manager_authorizer(&self) -> ProviderResult<Authorizer> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ProviderError::config(
                "Service principal credentials are not configured; set ARM_CLIENT_ID, \
                 ARM_CLIENT_SECRET, ARM_TENANT_ID and ARM_SUBSCRIPTION_ID",
            )
        })?;
        with_deadline(
            "authorize",
            self.timeouts.authorize,
            self.authorizers.get_authorizer(credentials),
        )
        .await
    }

    async fn pool_for(&self, attrs: &EmployeeAttributes) -> ProviderResult<DbPool> {
        let descriptor = attrs.descriptor()?;
        self.connections.open(&descriptor).await
    }

    /// Insert the row and return the planned state with `id` set.
    pub async fn create(&self, planned_state: Value) -> ProviderResult<Value> {
        with_deadline("create", self.timeouts.create, async {
            let attrs = EmployeeAttributes::from_state(&planned_state)?;
            let pool = self.pool_for(&attrs).await?;

            let id = self
                .engine
                .create(&pool, &attrs.name, &attrs.location)
                .await?;
            info!(resource = RESOURCE_TYPE, id, "Created employee");

            let mut state = planned_state;
            set_id(&mut state, id)?;
            Ok(state)
        })
        .await
    }

    /// Refresh state from the database.
    ///
    /// Returns `Ok(None)` when the row no longer exists, so the host clears
    /// the resource identity and plans a recreation.
    pub async fn read(&self, current_state: Value) -> ProviderResult<Option<Value>> {
        with_deadline("read", self.timeouts.read, async {
            let attrs = EmployeeAttributes::from_state(&current_state)?;
            let pool = self.pool_for(&attrs).await?;
            let mut state = current_state;

            let found = match attrs.id()? {
                Some(id) => self.engine.read_by_id(&pool, id).await.map(|record| {
                    if record.name != attrs.name || record.location != attrs.location {
                        debug!(id, "Employee drifted from recorded state");
                    }
                    (record.id, Some(record))
                }),
                None => self
                    .engine
                    .read(&pool, &attrs.name, &attrs.location)
                    .await
                    .map(|id| (id, None)),
            };

            match found {
                Ok((id, record)) => {
                    set_id(&mut state, id)?;
                    if let Some(record) = record {
                        set_attribute(&mut state, "name", Value::String(record.name))?;
                        set_attribute(&mut state, "location", Value::String(record.location))?;
                    }
                    Ok(Some(state))
                }
                Err(e) if e.is_not_found() => {
                    info!(resource = RESOURCE_TYPE, "Resource no longer exists");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Apply the planned attributes and return the new state.
    pub async fn update(&self, prior_state: Value, planned_state: Value) -> ProviderResult<Value> {
        with_deadline("update", self.timeouts.update, async {
            let prior = EmployeeAttributes::from_state(&prior_state)?;
            let planned = EmployeeAttributes::from_state(&planned_state)?;
            let pool = self.pool_for(&planned).await?;

            let id = match planned.id()?.or(prior.id()?) {
                Some(id) => {
                    let rows = self
                        .engine
                        .update_by_id(&pool, id, &planned.name, &planned.location)
                        .await?;
                    if rows == 0 {
                        warn!(id, "Update matched no rows; the employee may have been removed");
                    }
                    id
                }
                None => {
                    let rows = self
                        .engine
                        .update(&pool, &planned.name, &planned.location)
                        .await?;
                    debug!(rows, "Updated employees by name");
                    match self
                        .engine
                        .read(&pool, &planned.name, &planned.location)
                        .await
                    {
                        Ok(id) => id,
                        Err(e) if e.is_not_found() => {
                            // Without an identity the next read reports the resource absent
                            warn!(
                                resource = RESOURCE_TYPE,
                                "No employee matched the update; leaving state without an id"
                            );
                            let mut state = planned_state;
                            clear_id(&mut state)?;
                            return Ok(state);
                        }
                        Err(e) => return Err(e),
                    }
                }
            };
            info!(resource = RESOURCE_TYPE, id, "Updated employee");

            let mut state = planned_state;
            set_id(&mut state, id)?;
            Ok(state)
        })
        .await
    }

    /// Remove the row. Deleting an already absent row succeeds.
    pub async fn delete(&self, current_state: Value) -> ProviderResult<()> {
        with_deadline("delete", self.timeouts.delete, async {
            let attrs = EmployeeAttributes::from_state(&current_state)?;
            let pool = self.pool_for(&attrs).await?;

            let rows = match attrs.id()? {
                Some(id) => self.engine.delete_by_id(&pool, id).await?,
                None => {
                    self.engine
                        .delete(&pool, &attrs.name, &attrs.location)
                        .await?
                }
            };

            if rows == 0 {
                debug!("Employee already absent");
            }
            info!(resource = RESOURCE_TYPE, rows, "Deleted employee");
            Ok(())
        })
        .await
    }
}

impl std::fmt::Debug for SqlPluginProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlPluginProvider")
            .field("has_credentials", &self.credentials.is_some())
            .field("engine", &self.engine)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}
