//! SQL Server connections over TDS.
//!
//! sqlx has no SQL Server driver, so these pools hold `tiberius` clients
//! managed by `deadpool`. Like the sqlx pools they are lazy: building one
//! registers configuration and the first `get` opens the first connection.

use crate::config::DEFAULT_MAX_CONNECTIONS;
use crate::error::{ProviderError, ProviderResult};
use crate::models::ConnectionDescriptor;
use deadpool::Runtime;
use deadpool::managed::{self, Metrics, Pool, PoolError, RecycleResult};
use secrecy::ExposeSecret;
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

pub type MsSqlClient = Client<Compat<TcpStream>>;
pub type MsSqlPool = Pool<MsSqlManager>;

/// Opens and health-checks `tiberius` clients for one descriptor.
pub struct MsSqlManager {
    /// Holds the password - never log
    config: Config,
}

impl MsSqlManager {
    pub fn new(descriptor: &ConnectionDescriptor) -> Self {
        let mut config = Config::new();
        config.host(&descriptor.server);
        if let Some(port) = descriptor.port {
            config.port(port);
        }
        config.database(&descriptor.database);
        config.authentication(AuthMethod::sql_server(
            &descriptor.user,
            descriptor.password().expose_secret(),
        ));
        config.application_name(env!("CARGO_PKG_NAME"));
        Self { config }
    }
}

impl managed::Manager for MsSqlManager {
    type Type = MsSqlClient;
    type Error = tiberius::error::Error;

    async fn create(&self) -> Result<MsSqlClient, tiberius::error::Error> {
        match connect(self.config.clone()).await {
            // Azure SQL gateways redirect to the node that hosts the database
            Err(tiberius::error::Error::Routing { host, port }) => {
                debug!(host = %host, port, "Following SQL Server redirect");
                let mut config = self.config.clone();
                config.host(&host);
                config.port(port);
                connect(config).await
            }
            other => other,
        }
    }

    async fn recycle(
        &self,
        client: &mut MsSqlClient,
        _: &Metrics,
    ) -> RecycleResult<tiberius::error::Error> {
        client.simple_query("SELECT 1").await?.into_results().await?;
        Ok(())
    }
}

async fn connect(config: Config) -> Result<MsSqlClient, tiberius::error::Error> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write()).await
}

/// Build a lazy pool; `acquire_timeout` bounds waiting, connecting and recycling.
pub fn build_pool(
    descriptor: &ConnectionDescriptor,
    acquire_timeout: Duration,
) -> ProviderResult<MsSqlPool> {
    Pool::builder(MsSqlManager::new(descriptor))
        .max_size(DEFAULT_MAX_CONNECTIONS as usize)
        .wait_timeout(Some(acquire_timeout))
        .create_timeout(Some(acquire_timeout))
        .recycle_timeout(Some(acquire_timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| {
            ProviderError::connection(
                format!("Failed to build SQL Server pool: {}", e),
                "Check the server, port and database_name attributes",
            )
        })
}

/// Acquire a client and run a trivial batch on it.
pub async fn ping(pool: &MsSqlPool) -> Result<(), PoolError<tiberius::error::Error>> {
    let mut client = pool.get().await?;
    client
        .simple_query("SELECT 1")
        .await
        .map_err(PoolError::Backend)?
        .into_results()
        .await
        .map_err(PoolError::Backend)?;
    Ok(())
}
