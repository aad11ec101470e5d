//! Statement templates for the `Employees` table.
//!
//! Every template is a `&'static str` containing placeholders only. Values
//! reach the database exclusively through parameter binding, and the engine
//! only accepts `&'static str` statement text.

use crate::models::DatabaseType;

/// The statements one dialect needs for the full lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct Statements {
    /// `(name, location)`; returns the new identifier in the same round trip
    /// where the dialect supports `RETURNING`
    pub insert: &'static str,
    /// `(name, location)`; lowest identifier wins when several rows match
    pub select_by_key: &'static str,
    /// `(id)`
    pub select_by_id: &'static str,
    /// `(location, name)`
    pub update_location_by_name: &'static str,
    /// `(name, location, id)`
    pub update_by_id: &'static str,
    /// `(name, location)`
    pub delete_by_key: &'static str,
    /// `(id)`
    pub delete_by_id: &'static str,
}

/// `OUTPUT INSERTED.Id` returns the identifier from the insert itself.
pub const MSSQL: Statements = Statements {
    insert: "INSERT INTO Employees (Name, Location) OUTPUT CAST(INSERTED.Id AS BIGINT) \
             VALUES (@P1, @P2)",
    select_by_key: "SELECT TOP 1 CAST(Id AS BIGINT) AS id, Name AS name, Location AS location \
                    FROM Employees WHERE Name = @P1 AND Location = @P2 ORDER BY Id ASC",
    select_by_id: "SELECT CAST(Id AS BIGINT) AS id, Name AS name, Location AS location \
                   FROM Employees WHERE Id = @P1",
    update_location_by_name: "UPDATE Employees SET Location = @P1 WHERE Name = @P2",
    update_by_id: "UPDATE Employees SET Name = @P1, Location = @P2 WHERE Id = @P3",
    delete_by_key: "DELETE FROM Employees WHERE Name = @P1 AND Location = @P2",
    delete_by_id: "DELETE FROM Employees WHERE Id = @P1",
};

pub const POSTGRES: Statements = Statements {
    insert: "INSERT INTO Employees (Name, Location) VALUES ($1, $2) RETURNING CAST(Id AS BIGINT)",
    select_by_key: "SELECT CAST(Id AS BIGINT) AS id, Name AS name, Location AS location \
                    FROM Employees WHERE Name = $1 AND Location = $2 ORDER BY Id ASC LIMIT 1",
    select_by_id: "SELECT CAST(Id AS BIGINT) AS id, Name AS name, Location AS location \
                   FROM Employees WHERE Id = $1",
    update_location_by_name: "UPDATE Employees SET Location = $1 WHERE Name = $2",
    update_by_id: "UPDATE Employees SET Name = $1, Location = $2 WHERE Id = $3",
    delete_by_key: "DELETE FROM Employees WHERE Name = $1 AND Location = $2",
    delete_by_id: "DELETE FROM Employees WHERE Id = $1",
};

/// MySQL has no `RETURNING`; the insert's own result carries `last_insert_id`.
pub const MYSQL: Statements = Statements {
    insert: "INSERT INTO Employees (Name, Location) VALUES (?, ?)",
    select_by_key: "SELECT Id AS id, Name AS name, Location AS location \
                    FROM Employees WHERE Name = ? AND Location = ? ORDER BY Id ASC LIMIT 1",
    select_by_id: "SELECT Id AS id, Name AS name, Location AS location \
                   FROM Employees WHERE Id = ?",
    update_location_by_name: "UPDATE Employees SET Location = ? WHERE Name = ?",
    update_by_id: "UPDATE Employees SET Name = ?, Location = ? WHERE Id = ?",
    delete_by_key: "DELETE FROM Employees WHERE Name = ? AND Location = ?",
    delete_by_id: "DELETE FROM Employees WHERE Id = ?",
};

pub const SQLITE: Statements = Statements {
    insert: "INSERT INTO Employees (Name, Location) VALUES (?1, ?2) RETURNING Id",
    select_by_key: "SELECT Id AS id, Name AS name, Location AS location \
                    FROM Employees WHERE Name = ?1 AND Location = ?2 ORDER BY Id ASC LIMIT 1",
    select_by_id: "SELECT Id AS id, Name AS name, Location AS location \
                   FROM Employees WHERE Id = ?1",
    update_location_by_name: "UPDATE Employees SET Location = ?1 WHERE Name = ?2",
    update_by_id: "UPDATE Employees SET Name = ?1, Location = ?2 WHERE Id = ?3",
    delete_by_key: "DELETE FROM Employees WHERE Name = ?1 AND Location = ?2",
    delete_by_id: "DELETE FROM Employees WHERE Id = ?1",
};

pub fn for_dialect(dialect: DatabaseType) -> &'static Statements {
    match dialect {
        DatabaseType::MsSql => &MSSQL,
        DatabaseType::PostgreSQL => &POSTGRES,
        DatabaseType::MySQL => &MYSQL,
        DatabaseType::SQLite => &SQLITE,
    }
}
