//! The managed employee row.

/// One row of the `Employees` table.
///
/// `id` is assigned by the database on insert and is the row's identity.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EmployeeRecord {
    pub id: i64,
    pub name: String,
    pub location: String,
}
