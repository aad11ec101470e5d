//! SQL plugin provider - Main entry point.
//!
//! Runs one lifecycle phase of the `sqlplugin_mssql_employee` resource per
//! invocation. State documents are read from files (or stdin) and the
//! resulting state is written to stdout; logs go to stderr.

use azurerm_sqlplugin::config::Config;
use azurerm_sqlplugin::{ProviderError, SqlPluginProvider};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "azurerm-sqlplugin", version, about)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Insert the employee row and print the new state
    Create {
        /// Planned state file, or `-` for stdin
        #[arg(long)]
        state: PathBuf,
    },
    /// Refresh state from the database; prints `null` if the row is gone
    Read {
        #[arg(long)]
        state: PathBuf,
    },
    /// Apply planned changes and print the new state
    Update {
        /// Prior state file
        #[arg(long)]
        prior: PathBuf,
        /// Planned state file
        #[arg(long)]
        state: PathBuf,
    },
    /// Remove the employee row
    Delete {
        #[arg(long)]
        state: PathBuf,
    },
    /// Resolve the resource-manager authorizer and print its expiry
    Authorize,
}

/// Initialize the tracing subscriber for logging.
///
/// Logs are written to stderr so stdout carries only state documents.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn read_state(path: &Path) -> Result<Value, ProviderError> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .map_err(|e| ProviderError::invalid_input(format!("Failed to read stdin: {}", e)))?;
        buf
    } else {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            ProviderError::invalid_input(format!("Failed to read {}: {}", path.display(), e))
        })?
    };

    serde_json::from_str(&raw)
        .map_err(|e| ProviderError::invalid_input(format!("State is not valid JSON: {}", e)))
}

async fn write_output(value: &Value) -> Result<(), ProviderError> {
    let mut out = serde_json::to_string_pretty(value)
        .map_err(|e| ProviderError::invalid_input(format!("Failed to encode state: {}", e)))?;
    out.push('\n');

    let mut stdout = tokio::io::stdout();
    let written = match stdout.write_all(out.as_bytes()).await {
        Ok(()) => stdout.flush().await,
        Err(e) => Err(e),
    };
    written.map_err(|e| ProviderError::invalid_input(format!("Failed to write output: {}", e)))
}

async fn run(provider: &SqlPluginProvider, command: Command) -> Result<(), ProviderError> {
    match command {
        Command::Create { state } => {
            let planned = read_state(&state).await?;
            let state = provider.create(planned).await?;
            write_output(&state).await
        }
        Command::Read { state } => {
            let current = read_state(&state).await?;
            let state = provider.read(current).await?;
            write_output(&state.unwrap_or(Value::Null)).await
        }
        Command::Update { prior, state } => {
            let prior = read_state(&prior).await?;
            let planned = read_state(&state).await?;
            let state = provider.update(prior, planned).await?;
            write_output(&state).await
        }
        Command::Delete { state } => {
            let current = read_state(&state).await?;
            provider.delete(current).await
        }
        Command::Authorize => {
            let authorizer = provider.resource_manager_authorizer().await?;
            let expires_at = authorizer.expires_at().await;
            write_output(&serde_json::json!({ "expires_at": expires_at.to_rfc3339() })).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let cli = Cli::parse();

    init_tracing(&cli.config);

    info!("Starting azurerm-sqlplugin v{}", env!("CARGO_PKG_VERSION"));

    let provider = match SqlPluginProvider::configure(&cli.config) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&provider, cli.command).await;
    provider.connections().close_all().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Error: {}\nSuggestion: {}", e, suggestion);
            } else {
                eprintln!("Error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}
