//! SQL plugin provider library
//!
//! This library reconciles declared `sqlplugin_mssql_employee` resources
//! against an `Employees` table and resolves resource-manager credentials
//! for the provider configuration.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod provider;

pub use config::Config;
pub use error::{ProviderError, ProviderResult};
pub use provider::SqlPluginProvider;
