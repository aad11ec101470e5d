//! Parameter binding for reconciliation statements.
//!
//! This module binds `Bind` values to database-specific query objects.
//! SQL Server queries are `tiberius::Query` values and bind in place.

use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bind<'a> {
    Text(&'a str),
    Int(i64),
}

/// Bind parameters to a MySQL query.
pub(crate) fn bind_mysql<'q>(
    mut query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    params: &[Bind<'q>],
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match *param {
            Bind::Text(v) => query.bind(v),
            Bind::Int(v) => query.bind(v),
        };
    }
    query
}

/// Bind parameters to a PostgreSQL query.
pub(crate) fn bind_postgres<'q>(
    mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &[Bind<'q>],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match *param {
            Bind::Text(v) => query.bind(v),
            Bind::Int(v) => query.bind(v),
        };
    }
    query
}

/// Bind parameters to a SQLite query.
pub(crate) fn bind_sqlite<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Bind<'q>],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match *param {
            Bind::Text(v) => query.bind(v),
            Bind::Int(v) => query.bind(v),
        };
    }
    query
}

/// Bind parameters to a SQL Server query, in `@P1..@Pn` order.
pub(crate) fn bind_mssql<'q>(query: &mut tiberius::Query<'q>, params: &[Bind<'q>]) {
    for param in params {
        match *param {
            Bind::Text(v) => query.bind(v),
            Bind::Int(v) => query.bind(v),
        }
    }
}
