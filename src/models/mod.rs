//! Data models for the SQL plugin provider.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod employee;

// Re-export commonly used types
pub use connection::{ConnectionDescriptor, DatabaseType};
pub use employee::EmployeeRecord;
