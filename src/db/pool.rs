//! Connection pool management.
//!
//! Pools are database-specific (MsSqlPool, MySqlPool, PgPool, SqlitePool) and
//! opened lazily: opening only registers configuration, and no network
//! connection is made until the first liveness probe or statement.

use crate::config::{DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_CONNECTIONS_SQLITE};
use crate::db::mssql::{self, MsSqlPool};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{ConnectionDescriptor, DatabaseType};
use secrecy::ExposeSecret;
use sqlx::{
    Connection, MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions,
    mysql::MySqlPoolOptions, postgres::PgConnectOptions, postgres::PgPoolOptions,
    sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Clone)]
pub enum DbPool {
    MsSql(MsSqlPool),
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MsSql(pool) => pool.close(),
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MsSql(_) => DatabaseType::MsSql,
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Bounded liveness probe: acquire a connection and ping it.
    ///
    /// Every failure, including the deadline passing, is a `Connection` error.
    pub async fn ping(&self, probe_timeout: Duration) -> ProviderResult<()> {
        let result = match self {
            DbPool::MsSql(pool) => timeout(probe_timeout, mssql::ping(pool))
                .await
                .map(|r| r.map_err(|e| e.to_string())),
            DbPool::MySql(pool) => timeout(probe_timeout, ping_pool(pool))
                .await
                .map(|r| r.map_err(|e| e.to_string())),
            DbPool::Postgres(pool) => timeout(probe_timeout, ping_pool(pool))
                .await
                .map(|r| r.map_err(|e| e.to_string())),
            DbPool::SQLite(pool) => timeout(probe_timeout, ping_pool(pool))
                .await
                .map(|r| r.map_err(|e| e.to_string())),
        };

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ProviderError::connection(
                format!("Liveness probe failed: {}", e),
                connection_suggestion(self.db_type(), &e),
            )),
            Err(_) => Err(ProviderError::connection(
                format!(
                    "Liveness probe timed out after {}s",
                    probe_timeout.as_secs()
                ),
                format!(
                    "Check that the {} server is running and accessible",
                    self.db_type()
                ),
            )),
        }
    }
}

impl std::fmt::Debug for DbPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbPool::MsSql(pool) => f
                .debug_struct("MsSql")
                .field("status", &pool.status())
                .finish(),
            DbPool::MySql(pool) => f.debug_tuple("MySql").field(pool).finish(),
            DbPool::Postgres(pool) => f.debug_tuple("Postgres").field(pool).finish(),
            DbPool::SQLite(pool) => f.debug_tuple("SQLite").field(pool).finish(),
        }
    }
}

async fn ping_pool<DB: sqlx::Database>(pool: &sqlx::Pool<DB>) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}

/// Opens pools at most once per connection descriptor and hands them out.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    /// Keyed by the full connection string, which holds secrets - never log keys
    pools: Arc<RwLock<HashMap<String, DbPool>>>,
    probe_timeout: Duration,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            probe_timeout,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Get the pool for a descriptor, opening it lazily on first use.
    pub async fn open(&self, descriptor: &ConnectionDescriptor) -> ProviderResult<DbPool> {
        let key = pool_key(descriptor);

        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(&key) {
                return Ok(pool.clone());
            }
        }

        // Re-check under the write lock so concurrent first callers share one pool
        let mut pools = self.pools.write().await;
        if let Some(pool) = pools.get(&key) {
            return Ok(pool.clone());
        }

        let pool = self.create_pool(descriptor)?;
        info!(
            dialect = %descriptor.dialect,
            descriptor = %descriptor.masked_connection_string(),
            "Opened connection pool"
        );
        pools.insert(key, pool.clone());
        Ok(pool)
    }

    /// Verify that a pool is usable within the given deadline.
    pub async fn verify(&self, pool: &DbPool, probe_timeout: Duration) -> ProviderResult<()> {
        pool.ping(probe_timeout).await?;
        debug!(dialect = %pool.db_type(), "Liveness probe succeeded");
        Ok(())
    }

    /// Open (or reuse) the pool for a descriptor and verify it is live.
    pub async fn connect(&self, descriptor: &ConnectionDescriptor) -> ProviderResult<DbPool> {
        let pool = self.open(descriptor).await?;
        self.verify(&pool, self.probe_timeout).await?;
        Ok(pool)
    }

    /// Get the number of open pools.
    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }

    /// Close all pools.
    pub async fn close_all(&self) {
        let mut pools = self.pools.write().await;
        for (_, pool) in pools.drain() {
            pool.close().await;
        }
        info!("All connection pools closed");
    }

    /// Create a lazy pool for the given descriptor.
    fn create_pool(&self, descriptor: &ConnectionDescriptor) -> ProviderResult<DbPool> {
        let password = descriptor.password().expose_secret();
        let idle_timeout = Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS));

        match descriptor.dialect {
            DatabaseType::MsSql => Ok(DbPool::MsSql(mssql::build_pool(
                descriptor,
                self.probe_timeout,
            )?)),
            DatabaseType::MySQL => {
                let mut options = MySqlConnectOptions::new()
                    .host(&descriptor.server)
                    .username(&descriptor.user)
                    .password(password)
                    .database(&descriptor.database)
                    .charset("utf8mb4");
                if let Some(port) = descriptor.port {
                    options = options.port(port);
                }

                let pool = MySqlPoolOptions::new()
                    .max_connections(DEFAULT_MAX_CONNECTIONS)
                    .acquire_timeout(self.probe_timeout)
                    .idle_timeout(idle_timeout)
                    .connect_lazy_with(options);
                Ok(DbPool::MySql(pool))
            }
            DatabaseType::PostgreSQL => {
                let mut options = PgConnectOptions::new()
                    .host(&descriptor.server)
                    .username(&descriptor.user)
                    .password(password)
                    .database(&descriptor.database);
                if let Some(port) = descriptor.port {
                    options = options.port(port);
                }

                let pool = PgPoolOptions::new()
                    .max_connections(DEFAULT_MAX_CONNECTIONS)
                    .acquire_timeout(self.probe_timeout)
                    .idle_timeout(idle_timeout)
                    .connect_lazy_with(options);
                Ok(DbPool::Postgres(pool))
            }
            DatabaseType::SQLite => {
                // The table is an external prerequisite, so a missing file is an error
                let options = SqliteConnectOptions::new()
                    .filename(&descriptor.server)
                    .create_if_missing(false);

                let pool = SqlitePoolOptions::new()
                    .max_connections(DEFAULT_MAX_CONNECTIONS_SQLITE)
                    .acquire_timeout(self.probe_timeout)
                    .idle_timeout(idle_timeout)
                    .connect_lazy_with(options);
                Ok(DbPool::SQLite(pool))
            }
        }
    }
}

fn pool_key(descriptor: &ConnectionDescriptor) -> String {
    format!("{}|{}", descriptor.dialect, descriptor.connection_string())
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &str) -> String {
    let error_str = error.to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("authentication")
        || error_str.contains("password")
        || error_str.contains("login failed")
    {
        return "Verify the admin_user and admin_password attributes".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that database_name exists on the server".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match db_type {
        DatabaseType::MsSql | DatabaseType::PostgreSQL | DatabaseType::MySQL => {
            "Verify the server, port and database_name attributes".to_string()
        }
        DatabaseType::SQLite => {
            "Verify the database file exists and is accessible".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn sqlite_descriptor(path: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::new(
            DatabaseType::SQLite,
            path,
            "",
            "",
            "",
            SecretString::from(String::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_connection_manager_creation() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        assert_eq!(manager.pool_count().await, 0);
        assert_eq!(manager.probe_timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_open_is_lazy_and_reused() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        // No file exists here, but opening must not touch it
        let descriptor = sqlite_descriptor("/nonexistent/dir/hr.db");

        let first = manager.open(&descriptor).await.unwrap();
        let _second = manager.open(&descriptor).await.unwrap();

        assert_eq!(first.db_type(), DatabaseType::SQLite);
        assert_eq!(manager.pool_count().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_descriptors_get_distinct_pools() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        manager.open(&sqlite_descriptor("/tmp/a.db")).await.unwrap();
        manager.open(&sqlite_descriptor("/tmp/b.db")).await.unwrap();
        assert_eq!(manager.pool_count().await, 2);

        manager.close_all().await;
        assert_eq!(manager.pool_count().await, 0);
    }

    #[tokio::test]
    async fn test_sql_server_is_default_dialect_pool() {
        let manager = ConnectionManager::new(Duration::from_secs(1));
        let descriptor = ConnectionDescriptor::new(
            DatabaseType::default(),
            "127.0.0.1",
            "1",
            "tempdb",
            "sa",
            SecretString::from("pw".to_string()),
        )
        .unwrap();

        let pool = manager.open(&descriptor).await.unwrap();
        assert_eq!(pool.db_type(), DatabaseType::MsSql);

        let err = manager.verify(&pool, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Connection { .. }));
    }

    #[test]
    fn test_connection_suggestion_for_login_failure() {
        let suggestion =
            connection_suggestion(DatabaseType::MsSql, "Login failed for user 'sa'.");
        assert!(suggestion.contains("admin_password"));
    }

    #[tokio::test]
    async fn test_verify_missing_sqlite_file_is_connection_error() {
        let manager = ConnectionManager::new(Duration::from_secs(2));
        let descriptor = sqlite_descriptor("/nonexistent/dir/hr.db");
        let result = manager.connect(&descriptor).await;
        assert!(matches!(result, Err(ProviderError::Connection { .. })));
    }
}
