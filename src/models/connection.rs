//! Connection-related data models.
//!
//! This module defines the supported database dialects and the connection
//! descriptor assembled from a resource's declared attributes.

use crate::error::{ProviderError, ProviderResult};
use secrecy::{ExposeSecret, SecretString};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DatabaseType {
    /// Microsoft SQL Server and Azure SQL
    #[default]
    MsSql,
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse a dialect name as used in resource attributes.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mssql" | "sqlserver" => Some(Self::MsSql),
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MsSql => "SQL Server",
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MsSql => Some(1433),
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// How to reach and authenticate to the database server.
///
/// Renders to and parses from the `key=value;` shape with the keys
/// `server`, `user id`, `password`, `port` and `database`.
#[derive(Debug)]
pub struct ConnectionDescriptor {
    pub dialect: DatabaseType,
    /// Host name, or the database file path for SQLite
    pub server: String,
    pub port: Option<u16>,
    pub database: String,
    pub user: String,
    password: SecretString,
}

impl ConnectionDescriptor {
    /// Create a descriptor, validating the attributes.
    ///
    /// An empty `port` falls back to the dialect default.
    pub fn new(
        dialect: DatabaseType,
        server: impl Into<String>,
        port: &str,
        database: impl Into<String>,
        user: impl Into<String>,
        password: SecretString,
    ) -> ProviderResult<Self> {
        let server = server.into();
        let database = database.into();
        let user = user.into();

        if server.trim().is_empty() {
            return Err(malformed("server must not be empty"));
        }
        if dialect != DatabaseType::SQLite {
            if database.trim().is_empty() {
                return Err(malformed("database must not be empty"));
            }
            if user.trim().is_empty() {
                return Err(malformed("user id must not be empty"));
            }
        }

        let port = match port.trim() {
            "" => dialect.default_port(),
            p => Some(
                p.parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| malformed(format!("invalid port '{}'", p)))?,
            ),
        };

        Ok(Self {
            dialect,
            server,
            port,
            database,
            user,
            password,
        })
    }

    /// Parse a `key=value;` connection string for the given dialect.
    pub fn parse(dialect: DatabaseType, connection_string: &str) -> ProviderResult<Self> {
        let mut server = String::new();
        let mut port = String::new();
        let mut database = String::new();
        let mut user = String::new();
        let mut password = String::new();

        for (key, value) in split_pairs(connection_string)? {
            match key.to_ascii_lowercase().as_str() {
                "server" => server = value,
                "port" => port = value,
                "database" => database = value,
                "user id" => user = value,
                "password" => password = value,
                other => return Err(malformed(format!("unknown key '{}'", other))),
            }
        }

        Self::new(
            dialect,
            server,
            &port,
            database,
            user,
            SecretString::from(password),
        )
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Full connection string. Contains the password; never log it.
    pub fn connection_string(&self) -> String {
        self.render(self.password.expose_secret())
    }

    /// Display-safe connection string with the password masked.
    pub fn masked_connection_string(&self) -> String {
        self.render("****")
    }

    fn render(&self, password: &str) -> String {
        let port = self.port.map(|p| p.to_string()).unwrap_or_default();
        [
            ("server", self.server.as_str()),
            ("user id", self.user.as_str()),
            ("password", password),
            ("port", port.as_str()),
            ("database", self.database.as_str()),
        ]
        .iter()
        .map(|(k, v)| format!("{}={};", k, quote(v)))
        .collect()
    }
}

fn malformed(detail: impl Into<String>) -> ProviderError {
    ProviderError::connection(
        format!("Malformed connection descriptor: {}", detail.into()),
        "Check the server, port, database_name and admin_user attributes",
    )
}

/// Quote a value if it would otherwise break the `key=value;` framing.
fn quote(value: &str) -> String {
    if value.contains([';', '"']) || value.trim() != value {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split `key=value;` pairs, honoring double-quoted values.
fn split_pairs(s: &str) -> ProviderResult<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = s.chars().peekable();

    loop {
        let mut key = String::new();
        for c in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }
        let key = key.trim().to_string();

        while chars.peek().is_some_and(|c| *c == ' ') {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        value.push('"');
                    }
                    Some('"') => break,
                    Some(c) => value.push(c),
                    None => return Err(malformed("unterminated quoted value")),
                }
            }
            // Skip to the separator
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
                value.push(c);
            }
            value = value.trim().to_string();
        }

        if !key.is_empty() {
            pairs.push((key, value));
        } else if !value.is_empty() {
            return Err(malformed("value without a key"));
        }

        if chars.peek().is_none() {
            break;
        }
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_database_type_from_name() {
        assert_eq!(
            DatabaseType::from_name("postgresql"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(DatabaseType::from_name("Postgres"), Some(DatabaseType::PostgreSQL));
        assert_eq!(DatabaseType::from_name("mariadb"), Some(DatabaseType::MySQL));
        assert_eq!(DatabaseType::from_name("sqlite"), Some(DatabaseType::SQLite));
        assert_eq!(DatabaseType::from_name("sqlserver"), Some(DatabaseType::MsSql));
        assert_eq!(DatabaseType::from_name("MSSQL"), Some(DatabaseType::MsSql));
        assert_eq!(DatabaseType::from_name("oracle"), None);
        assert_eq!(DatabaseType::default(), DatabaseType::MsSql);
    }

    #[test]
    fn test_connection_string_shape() {
        let d = ConnectionDescriptor::new(
            DatabaseType::PostgreSQL,
            "db.example.com",
            "5433",
            "hr",
            "admin",
            secret("p@ss"),
        )
        .unwrap();
        assert_eq!(
            d.connection_string(),
            "server=db.example.com;user id=admin;password=p@ss;port=5433;database=hr;"
        );
    }

    #[test]
    fn test_masked_connection_string() {
        let d = ConnectionDescriptor::new(
            DatabaseType::MySQL,
            "localhost",
            "",
            "hr",
            "sa",
            secret("yourStrong(!)Password1"),
        )
        .unwrap();
        let masked = d.masked_connection_string();
        assert!(!masked.contains("yourStrong"));
        assert!(masked.contains("password=****;"));
        assert!(masked.contains("port=3306;"));
    }

    #[test]
    fn test_sql_server_defaults_to_1433() {
        let d = ConnectionDescriptor::new(
            DatabaseType::default(),
            "localhost",
            "",
            "tempdb",
            "sa",
            secret("pw"),
        )
        .unwrap();
        assert_eq!(d.dialect, DatabaseType::MsSql);
        assert_eq!(
            d.masked_connection_string(),
            "server=localhost;user id=sa;password=****;port=1433;database=tempdb;"
        );
    }

    #[test]
    fn test_invalid_port_is_connection_error() {
        let result = ConnectionDescriptor::new(
            DatabaseType::PostgreSQL,
            "localhost",
            "not-a-port",
            "hr",
            "admin",
            secret("pw"),
        );
        assert!(matches!(result, Err(ProviderError::Connection { .. })));
    }

    #[test]
    fn test_missing_database_is_rejected() {
        let result = ConnectionDescriptor::new(
            DatabaseType::PostgreSQL,
            "localhost",
            "5432",
            " ",
            "admin",
            secret("pw"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_sqlite_needs_only_a_path() {
        let d = ConnectionDescriptor::new(
            DatabaseType::SQLite,
            "/tmp/hr.db",
            "",
            "",
            "",
            secret(""),
        )
        .unwrap();
        assert_eq!(d.port, None);
        assert_eq!(d.server, "/tmp/hr.db");
    }

    #[test]
    fn test_parse_round_trips_awkward_password() {
        let d = ConnectionDescriptor::new(
            DatabaseType::PostgreSQL,
            "localhost",
            "1433",
            "tempdb",
            "sa",
            secret("semi;colon \"quoted\""),
        )
        .unwrap();
        let parsed =
            ConnectionDescriptor::parse(DatabaseType::PostgreSQL, &d.connection_string()).unwrap();
        assert_eq!(
            parsed.password().expose_secret(),
            "semi;colon \"quoted\""
        );
        assert_eq!(parsed.port, Some(1433));
        assert_eq!(parsed.database, "tempdb");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let d = ConnectionDescriptor::parse(
            DatabaseType::MySQL,
            "Server=localhost; User ID=sa; Password=pw; Port=3307; Database=hr",
        )
        .unwrap();
        assert_eq!(d.server, "localhost");
        assert_eq!(d.user, "sa");
        assert_eq!(d.port, Some(3307));
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        let result =
            ConnectionDescriptor::parse(DatabaseType::MySQL, "server=localhost;timeout=5;");
        assert!(matches!(result, Err(ProviderError::Connection { .. })));
    }
}
