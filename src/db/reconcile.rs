//! Reconciliation engine for the `Employees` table.
//!
//! Each lifecycle operation confirms the pool is live, then runs exactly one
//! parameter-bound statement under the statement timeout. Liveness failures
//! surface as `Connection`, statement failures as `Data`, an empty lookup as
//! `NotFound` and an expired deadline as `Timeout`.
//!
//! # Architecture
//!
//! Statement text comes from [`statements`](super::statements); execution is
//! delegated to the `mssql`, `mysql`, `postgres` and `sqlite` submodules
//! below, which share one shape adapted to each driver.

use crate::config::{DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_STATEMENT_TIMEOUT_SECS};
use crate::db::params::Bind;
use crate::db::pool::DbPool;
use crate::db::statements::{self, Statements};
use crate::error::{ProviderError, ProviderResult};
use crate::models::EmployeeRecord;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Translates lifecycle operations into statements against a pool.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    probe_timeout: Duration,
    statement_timeout: Duration,
}

impl ReconciliationEngine {
    /// Create an engine with the default probe and statement timeouts.
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeouts(probe_timeout: Duration, statement_timeout: Duration) -> Self {
        Self {
            probe_timeout,
            statement_timeout,
        }
    }

    /// Insert a new row and return its database-assigned identifier.
    ///
    /// Not idempotent: every call inserts a row. If this times out the row may
    /// or may not exist, so callers should re-read before retrying.
    pub async fn create(&self, pool: &DbPool, name: &str, location: &str) -> ProviderResult<i64> {
        self.ensure_live(pool).await?;
        let sql = self.statements(pool).insert;
        let binds = [Bind::Text(name), Bind::Text(location)];
        debug!(dialect = %pool.db_type(), name = %name, "Inserting employee");

        match pool {
            DbPool::MsSql(p) => self.bounded("create", mssql::insert(p, sql, &binds)).await,
            DbPool::MySql(p) => self.bounded("create", mysql::insert(p, sql, &binds)).await,
            DbPool::Postgres(p) => self.bounded("create", postgres::insert(p, sql, &binds)).await,
            DbPool::SQLite(p) => self.bounded("create", sqlite::insert(p, sql, &binds)).await,
        }
    }

    /// Look up the lowest identifier whose row matches `(name, location)`.
    pub async fn read(&self, pool: &DbPool, name: &str, location: &str) -> ProviderResult<i64> {
        let sql = self.statements(pool).select_by_key;
        let binds = [Bind::Text(name), Bind::Text(location)];
        let record = self.fetch_record(pool, "read", sql, &binds).await?;
        record.map(|r| r.id).ok_or_else(|| {
            ProviderError::not_found(format!("employee name={} location={}", name, location))
        })
    }

    /// Set `location` on every row named `name`; returns the affected count.
    pub async fn update(&self, pool: &DbPool, name: &str, location: &str) -> ProviderResult<u64> {
        let sql = self.statements(pool).update_location_by_name;
        let binds = [Bind::Text(location), Bind::Text(name)];
        self.execute(pool, "update", sql, &binds).await
    }

    /// Delete rows matching `(name, location)`; returns the affected count.
    pub async fn delete(&self, pool: &DbPool, name: &str, location: &str) -> ProviderResult<u64> {
        let sql = self.statements(pool).delete_by_key;
        let binds = [Bind::Text(name), Bind::Text(location)];
        self.execute(pool, "delete", sql, &binds).await
    }

    /// Fetch the row with the given identifier.
    pub async fn read_by_id(&self, pool: &DbPool, id: i64) -> ProviderResult<EmployeeRecord> {
        let sql = self.statements(pool).select_by_id;
        let record = self.fetch_record(pool, "read", sql, &[Bind::Int(id)]).await?;
        record.ok_or_else(|| ProviderError::not_found(format!("employee id={}", id)))
    }

    /// Overwrite name and location of the row with the given identifier.
    pub async fn update_by_id(
        &self,
        pool: &DbPool,
        id: i64,
        name: &str,
        location: &str,
    ) -> ProviderResult<u64> {
        let sql = self.statements(pool).update_by_id;
        let binds = [Bind::Text(name), Bind::Text(location), Bind::Int(id)];
        self.execute(pool, "update", sql, &binds).await
    }

    pub async fn delete_by_id(&self, pool: &DbPool, id: i64) -> ProviderResult<u64> {
        let sql = self.statements(pool).delete_by_id;
        self.execute(pool, "delete", sql, &[Bind::Int(id)]).await
    }

    fn statements(&self, pool: &DbPool) -> &'static Statements {
        statements::for_dialect(pool.db_type())
    }

    async fn ensure_live(&self, pool: &DbPool) -> ProviderResult<()> {
        pool.ping(self.probe_timeout).await
    }

    async fn fetch_record(
        &self,
        pool: &DbPool,
        operation: &str,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> ProviderResult<Option<EmployeeRecord>> {
        self.ensure_live(pool).await?;
        debug!(dialect = %pool.db_type(), operation, "Fetching employee");

        match pool {
            DbPool::MsSql(p) => self.bounded(operation, mssql::fetch_record(p, sql, binds)).await,
            DbPool::MySql(p) => self.bounded(operation, mysql::fetch_record(p, sql, binds)).await,
            DbPool::Postgres(p) => {
                self.bounded(operation, postgres::fetch_record(p, sql, binds))
                    .await
            }
            DbPool::SQLite(p) => self.bounded(operation, sqlite::fetch_record(p, sql, binds)).await,
        }
    }

    async fn execute(
        &self,
        pool: &DbPool,
        operation: &str,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> ProviderResult<u64> {
        self.ensure_live(pool).await?;
        debug!(dialect = %pool.db_type(), operation, "Executing statement");

        let rows_affected = match pool {
            DbPool::MsSql(p) => self.bounded(operation, mssql::execute(p, sql, binds)).await?,
            DbPool::MySql(p) => self.bounded(operation, mysql::execute(p, sql, binds)).await?,
            DbPool::Postgres(p) => self.bounded(operation, postgres::execute(p, sql, binds)).await?,
            DbPool::SQLite(p) => self.bounded(operation, sqlite::execute(p, sql, binds)).await?,
        };

        debug!(operation, rows_affected, "Statement complete");
        Ok(rows_affected)
    }

    /// Run a statement future under the statement timeout.
    async fn bounded<T, E>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> ProviderResult<T>
    where
        ProviderError: From<E>,
    {
        match timeout(self.statement_timeout, fut).await {
            Ok(result) => result.map_err(ProviderError::from),
            Err(_) => Err(ProviderError::timeout(
                operation,
                self.statement_timeout.as_secs(),
            )),
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// Only `insert` differs in shape: MySQL reports the identifier in the result
// packet, SQL Server returns it from `OUTPUT` and the others from `RETURNING`.

mod mssql {
    use super::*;
    use crate::db::mssql::MsSqlPool;
    use crate::db::params::bind_mssql;
    use tiberius::{Query, Row};

    pub async fn insert(
        pool: &MsSqlPool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> ProviderResult<i64> {
        let mut client = pool.get().await?;
        let mut query = Query::new(sql);
        bind_mssql(&mut query, binds);

        let row = query.query(&mut *client).await?.into_row().await?;
        row.as_ref()
            .map(|r| r.try_get::<i64, _>(0))
            .transpose()?
            .flatten()
            .ok_or_else(|| {
                ProviderError::data(
                    "Insert returned no identifier",
                    None,
                    "Check that Employees.Id is an IDENTITY column",
                )
            })
    }

    pub async fn fetch_record(
        pool: &MsSqlPool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> ProviderResult<Option<EmployeeRecord>> {
        let mut client = pool.get().await?;
        let mut query = Query::new(sql);
        bind_mssql(&mut query, binds);

        let row = query.query(&mut *client).await?.into_row().await?;
        row.as_ref().map(to_record).transpose()
    }

    pub async fn execute(
        pool: &MsSqlPool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> ProviderResult<u64> {
        let mut client = pool.get().await?;
        let mut query = Query::new(sql);
        bind_mssql(&mut query, binds);

        let result = query.execute(&mut *client).await?;
        Ok(result.total())
    }

    fn to_record(row: &Row) -> ProviderResult<EmployeeRecord> {
        let id = row.try_get::<i64, _>("id")?;
        let name = row.try_get::<&str, _>("name")?;
        let location = row.try_get::<&str, _>("location")?;

        match (id, name, location) {
            (Some(id), Some(name), Some(location)) => Ok(EmployeeRecord {
                id,
                name: name.to_string(),
                location: location.to_string(),
            }),
            _ => Err(ProviderError::data(
                "Employee row has NULL columns",
                None,
                "Id, Name and Location must be NOT NULL",
            )),
        }
    }
}

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql;
    use sqlx::{FromRow, MySqlPool};

    pub async fn insert(
        pool: &MySqlPool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> Result<i64, sqlx::Error> {
        let result = bind_mysql(sqlx::query(sql), binds).execute(pool).await?;
        i64::try_from(result.last_insert_id()).map_err(|e| sqlx::Error::Decode(Box::new(e)))
    }

    pub async fn fetch_record(
        pool: &MySqlPool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> Result<Option<EmployeeRecord>, sqlx::Error> {
        let row = bind_mysql(sqlx::query(sql), binds)
            .fetch_optional(pool)
            .await?;
        row.map(|r| EmployeeRecord::from_row(&r)).transpose()
    }

    pub async fn execute(
        pool: &MySqlPool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> Result<u64, sqlx::Error> {
        let result = bind_mysql(sqlx::query(sql), binds).execute(pool).await?;
        Ok(result.rows_affected())
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres;
    use sqlx::{FromRow, PgPool, Row};

    pub async fn insert(
        pool: &PgPool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> Result<i64, sqlx::Error> {
        let row = bind_postgres(sqlx::query(sql), binds)
            .fetch_one(pool)
            .await?;
        row.try_get::<i64, _>(0)
    }

    pub async fn fetch_record(
        pool: &PgPool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> Result<Option<EmployeeRecord>, sqlx::Error> {
        let row = bind_postgres(sqlx::query(sql), binds)
            .fetch_optional(pool)
            .await?;
        row.map(|r| EmployeeRecord::from_row(&r)).transpose()
    }

    pub async fn execute(
        pool: &PgPool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> Result<u64, sqlx::Error> {
        let result = bind_postgres(sqlx::query(sql), binds).execute(pool).await?;
        Ok(result.rows_affected())
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite;
    use sqlx::{FromRow, Row, SqlitePool};

    pub async fn insert(
        pool: &SqlitePool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> Result<i64, sqlx::Error> {
        let row = bind_sqlite(sqlx::query(sql), binds)
            .fetch_one(pool)
            .await?;
        row.try_get::<i64, _>(0)
    }

    pub async fn fetch_record(
        pool: &SqlitePool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> Result<Option<EmployeeRecord>, sqlx::Error> {
        let row = bind_sqlite(sqlx::query(sql), binds)
            .fetch_optional(pool)
            .await?;
        row.map(|r| EmployeeRecord::from_row(&r)).transpose()
    }

    pub async fn execute(
        pool: &SqlitePool,
        sql: &'static str,
        binds: &[Bind<'_>],
    ) -> Result<u64, sqlx::Error> {
        let result = bind_sqlite(sqlx::query(sql), binds).execute(pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let engine = ReconciliationEngine::new();
        assert_eq!(
            engine.statement_timeout,
            Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS)
        );
        assert_eq!(
            engine.probe_timeout,
            Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS)
        );
    }

    #[tokio::test]
    async fn test_stalled_statement_maps_to_timeout() {
        let engine = ReconciliationEngine::with_timeouts(
            Duration::from_secs(1),
            Duration::from_millis(10),
        );

        let result = engine
            .bounded("create", std::future::pending::<Result<i64, sqlx::Error>>())
            .await;

        match result {
            Err(ProviderError::Timeout { ref operation, .. }) => assert_eq!(operation, "create"),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_statement_error_keeps_its_kind() {
        let engine = ReconciliationEngine::new();

        let result = engine
            .bounded("read", async { Err::<i64, _>(sqlx::Error::RowNotFound) })
            .await;
        assert!(matches!(result, Err(ProviderError::NotFound { .. })));
    }

    #[test]
    fn test_engine_custom_timeouts() {
        let engine =
            ReconciliationEngine::with_timeouts(Duration::from_secs(2), Duration::from_secs(60));
        assert_eq!(engine.probe_timeout, Duration::from_secs(2));
        assert_eq!(engine.statement_timeout, Duration::from_secs(60));
    }
}
