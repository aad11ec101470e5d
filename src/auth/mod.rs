//! Cloud credential handling for the resource-manager API.
//!
//! - [`cloud`]: cloud endpoint sets and the credential configuration
//! - [`authorizer`]: the self-refreshing bearer authorizer
//! - [`resolver`]: client-credentials resolution against the cloud authority
//! - [`cache`]: the per-provider single-flight authorizer cache

pub mod authorizer;
pub mod cache;
pub mod cloud;
pub mod resolver;

pub use authorizer::{AccessToken, Authorizer, TokenSource};
pub use cache::AuthorizerCache;
pub use cloud::{CloudEnvironment, CredentialConfig};
pub use resolver::{CredentialResolver, ServicePrincipalResolver};
