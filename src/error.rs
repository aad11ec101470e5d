//! Error types for the SQL plugin provider.
//!
//! Every lifecycle operation returns a typed [`ProviderError`]; nothing in the
//! library terminates the process. Each variant that a user can act on carries
//! a suggestion alongside the message.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Invalid or unresolvable credential / cloud configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Credential resolution or token acquisition failed.
    #[error("Authentication failed: {message}")]
    Auth { message: String, suggestion: String },

    /// Connection open or liveness failure.
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// Statement execution failure unrelated to connectivity.
    #[error("Database error: {message}")]
    Data {
        message: String,
        /// e.g., "23505" for a unique violation
        sql_state: Option<String>,
        suggestion: String,
    },

    /// A lookup matched zero rows. A valid outcome, not a failure.
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl ProviderError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an authentication error with a helpful suggestion.
    pub fn auth(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a data error with optional SQL state.
    pub fn data(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Data {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Auth { suggestion, .. } => Some(suggestion),
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Data { suggestion, .. } => Some(suggestion),
            Self::Timeout { .. } => Some("The outcome is unknown; re-read the resource to confirm"),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convert sqlx errors to ProviderError.
///
/// Transport-level failures become `Connection`; anything the server rejected
/// while executing a statement becomes `Data`.
impl From<sqlx::Error> for ProviderError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ProviderError::connection(
                msg.to_string(),
                "Check the server, port, database and admin credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                ProviderError::data(
                    db_err.message(),
                    code,
                    "Check that the Employees table exists with Id, Name and Location columns",
                )
            }
            sqlx::Error::RowNotFound => ProviderError::not_found("no matching row"),
            sqlx::Error::PoolTimedOut => ProviderError::connection(
                "Timed out acquiring a connection from the pool",
                "Check that the database server is reachable",
            ),
            sqlx::Error::PoolClosed => {
                ProviderError::connection("Connection pool is closed", "Reconfigure the provider")
            }
            sqlx::Error::Io(io_err) => ProviderError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => ProviderError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => ProviderError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => ProviderError::data(
                format!("Column not found: {}", col),
                None,
                "Check the Employees table schema",
            ),
            sqlx::Error::ColumnDecode { index, source } => ProviderError::data(
                format!("Failed to decode column {}: {}", index, source),
                None,
                "Check that Id is an integer column",
            ),
            sqlx::Error::Decode(source) => {
                ProviderError::data(format!("Decode error: {}", source), None, "")
            }
            other => ProviderError::data(format!("Unexpected database error: {}", other), None, ""),
        }
    }
}

// SQL Server login failed / cannot open the requested database
const MSSQL_LOGIN_ERRORS: [u32; 2] = [18456, 4060];

/// Convert SQL Server driver errors to ProviderError.
///
/// Server errors are statement failures except for login rejections, which
/// are connectivity problems like their sqlx counterparts.
impl From<tiberius::error::Error> for ProviderError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;

        match err {
            TdsError::Server(token) if MSSQL_LOGIN_ERRORS.contains(&token.code()) => {
                ProviderError::connection(
                    token.message().to_string(),
                    "Verify the admin_user, admin_password and database_name attributes",
                )
            }
            TdsError::Server(token) => ProviderError::data(
                token.message().to_string(),
                Some(token.code().to_string()),
                "Check that the Employees table exists with Id, Name and Location columns",
            ),
            e @ (TdsError::Io { .. }
            | TdsError::Tls(_)
            | TdsError::Protocol(_)
            | TdsError::Routing { .. }) => ProviderError::connection(
                e.to_string(),
                "Check network connectivity and SQL Server status",
            ),
            other => ProviderError::data(
                format!("Unexpected SQL Server error: {}", other),
                None,
                "",
            ),
        }
    }
}

impl From<deadpool::managed::PoolError<tiberius::error::Error>> for ProviderError {
    fn from(err: deadpool::managed::PoolError<tiberius::error::Error>) -> Self {
        use deadpool::managed::PoolError;

        match err {
            PoolError::Backend(e) => e.into(),
            PoolError::Timeout(_) => ProviderError::connection(
                "Timed out acquiring a connection from the pool",
                "Check that the database server is reachable",
            ),
            other => ProviderError::connection(
                format!("Connection pool error: {}", other),
                "Reconfigure the provider",
            ),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::auth(
            format!("Token request failed: {}", err),
            "Check network access to the cloud authority endpoint",
        )
    }
}

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = ProviderError::data("Syntax error", Some("42601".to_string()), "Check SQL");
        assert_eq!(err.suggestion(), Some("Check SQL"));
        assert_eq!(ProviderError::config("bad cloud").suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(ProviderError::timeout("create", 30).is_retryable());
        assert!(ProviderError::connection("err", "sugg").is_retryable());
        assert!(!ProviderError::data("err", None, "").is_retryable());
        assert!(!ProviderError::auth("rejected", "").is_retryable());
    }

    #[test]
    fn test_not_found_is_distinct() {
        assert!(ProviderError::not_found("employee").is_not_found());
        assert!(!ProviderError::data("boom", None, "").is_not_found());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: ProviderError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_pool_timeout_maps_to_connection() {
        let err: ProviderError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ProviderError::Connection { .. }));
    }

    #[test]
    fn test_tds_io_error_maps_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: ProviderError = tiberius::error::Error::from(io).into();
        assert!(matches!(err, ProviderError::Connection { .. }));
    }

    #[test]
    fn test_tds_conversion_error_maps_to_data() {
        let err: ProviderError =
            tiberius::error::Error::Conversion("bad bigint".into()).into();
        assert!(matches!(err, ProviderError::Data { .. }));
    }

    #[test]
    fn test_io_error_maps_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: ProviderError = sqlx::Error::Io(io).into();
        assert!(matches!(err, ProviderError::Connection { .. }));
        assert!(err.to_string().contains("refused"));
    }
}
