//! Database access layer.
//!
//! This module provides:
//! - Lazy connection pools with bounded liveness probes
//! - Constant statement templates per dialect
//! - Parameter binding
//! - The reconciliation engine for the `Employees` table

pub mod mssql;
pub mod params;
pub mod pool;
pub mod reconcile;
pub mod statements;

pub use params::Bind;
pub use pool::{ConnectionManager, DbPool};
pub use reconcile::ReconciliationEngine;
pub use statements::Statements;
