//! Error types for connection, statement, schema and file operations.

use std::path::PathBuf;

/// Errors raised while establishing or using the connection handle.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// No connection handle exists.
    #[error("Not connected to a database")]
    NotConnected,

    /// A connection handle already exists.
    #[error("Already connected to a database")]
    AlreadyConnected,

    /// The pre-flight reachability probe failed.
    #[error("Port {port} on '{host}' is not reachable")]
    PortClosed {
        /// Probed host.
        host: String,
        /// Probed port.
        port: u16,
    },

    /// The driver refused the connection.
    #[error("Could not connect to database [{}]: {message}", .code.as_deref().unwrap_or("-"))]
    ConnectFailed {
        /// Native driver error code, when the server reported one.
        code: Option<String>,
        /// Driver error message.
        message: String,
    },

    /// The configuration cannot be turned into a connection URL.
    #[error("Invalid connection configuration: {0}")]
    InvalidConfig(String),

    /// Closing the connection failed.
    #[error("Failed to close connection: {0}")]
    CloseFailed(#[source] sqlx::Error),
}

/// Errors raised by the statement executor.
#[derive(Debug, thiserror::Error)]
pub enum StatementError {
    /// The driver rejected the query text.
    #[error("Unable to prepare statement '{query}': {source}")]
    PrepareFailed {
        /// Query text.
        query: String,
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },

    /// Parameter binding was rejected.
    #[error("Unable to bind parameters for '{query}': {message}")]
    BindFailed {
        /// Query text.
        query: String,
        /// Reason.
        message: String,
    },

    /// The driver failed while executing the statement.
    #[error("Unable to execute '{query}': {source}")]
    ExecFailed {
        /// Query text.
        query: String,
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },
}

/// Errors about schema definitions, versions and snapshots.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A table or column description cannot be turned into DDL.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// The table must not exist but does.
    #[error("Table '{0}' already exists")]
    TableExists(String),

    /// The table must exist but does not.
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    /// The `version` table has no row.
    #[error("The version table is empty")]
    NoVersionRow,

    /// The `version` table holds something that is not an integer.
    #[error("Invalid version value '{0}'")]
    InvalidVersion(String),

    /// The requested target snapshot does not exist.
    #[error("Target schema snapshot not found{}", .version.map(|v| format!(" for version {v}")).unwrap_or_default())]
    TargetNotFound {
        /// Requested version, `None` when the latest was requested.
        version: Option<i64>,
    },

    /// No snapshot exists for the database's current version.
    #[error("Schema snapshot for current version {0} not found")]
    CurrentNotFound(i64),

    /// The target is older than the current version.
    #[error("Cannot upgrade from version {current} down to version {target}")]
    VersionRegression {
        /// Current version.
        current: i64,
        /// Target version.
        target: i64,
    },

    /// The database is already at the target version.
    #[error("Database is already at version {0}")]
    NoOp(i64),
}

/// Errors reading or writing snapshot and backup files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The file or directory does not exist.
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Reading failed.
    #[error("Failed to read '{}': {source}", .path.display())]
    ReadFailed {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing failed.
    #[error("Failed to write '{}': {source}", .path.display())]
    WriteFailed {
        /// Path being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A snapshot or config file is not valid JSON for its type.
    #[error("Malformed file '{}': {source}", .path.display())]
    Malformed {
        /// Path being parsed.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Any error produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Statement failure.
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// Schema or version failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// File failure.
    #[error(transparent)]
    Io(#[from] IoError),
}

impl Error {
    /// Returns true for the documented no-op upgrade case.
    #[must_use]
    pub const fn is_no_op(&self) -> bool {
        matches!(self, Self::Schema(SchemaError::NoOp(_)))
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, Error>;
