//! Connection management.
//!
//! A [`Connection`] owns at most one live driver handle. It is either fully
//! connected or has no handle at all; a failed connect never leaves a
//! half-initialised handle behind. The handle is the backend's native sqlx
//! connection, so every column type the driver knows can be read back.

use std::time::Duration;

use sqlx::mysql::MySqlConnection;
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection as _;
use tokio::net::TcpStream;
use tracing::instrument::WithSubscriber;
use tracing::subscriber::NoSubscriber;
use tracing::{debug, info};

use crate::config::{Backend, DatabaseConfig};
use crate::dialect::Dialect;
use crate::error::{ConnectionError, Result, StatementError};

/// How long the reachability probe waits for a TCP handshake.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Native driver connection of the configured backend.
pub(crate) enum Handle {
    MySql(MySqlConnection),
    Sqlite(SqliteConnection),
}

impl Handle {
    async fn open(backend: Backend, url: &str) -> std::result::Result<Self, sqlx::Error> {
        match backend {
            Backend::MySql => MySqlConnection::connect(url).await.map(Self::MySql),
            Backend::Sqlite => SqliteConnection::connect(url).await.map(Self::Sqlite),
        }
    }

    async fn close(self) -> std::result::Result<(), sqlx::Error> {
        match self {
            Self::MySql(conn) => conn.close().await,
            Self::Sqlite(conn) => conn.close().await,
        }
    }

    /// Runs SQL text without preparing it, draining every result set.
    pub(crate) async fn run_raw(&mut self, sql: &str) -> std::result::Result<u64, sqlx::Error> {
        let affected = match self {
            Self::MySql(conn) => sqlx::raw_sql(sql).execute(conn).await?.rows_affected(),
            Self::Sqlite(conn) => sqlx::raw_sql(sql).execute(conn).await?.rows_affected(),
        };
        Ok(affected)
    }
}

/// Owner of the single database handle.
pub struct Connection {
    config: DatabaseConfig,
    dialect: Box<dyn Dialect>,
    handle: Option<Handle>,
}

impl Connection {
    /// Creates a disconnected connection for the given configuration.
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        let dialect = config.backend.dialect();
        Self {
            config,
            dialect,
            handle: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Returns the dialect of the configured backend.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Returns true while a handle exists.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Opens the connection.
    ///
    /// The backend's port is probed first (backends without a port skip the
    /// probe). Driver diagnostics are silenced for the duration of the
    /// connect attempt only.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::AlreadyConnected`], a closed port, an invalid
    /// configuration or the driver's refusal.
    pub async fn connect(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(ConnectionError::AlreadyConnected.into());
        }

        if let Some(port) = self.config.probe_port(self.dialect.as_ref()) {
            if !port_open(&self.config.host, port).await {
                return Err(ConnectionError::PortClosed {
                    host: self.config.host.clone(),
                    port,
                }
                .into());
            }
        }

        let url = self.config.url()?;
        let attempt = Handle::open(self.config.backend, &url)
            .with_subscriber(NoSubscriber::default())
            .await;

        match attempt {
            Ok(handle) => {
                self.handle = Some(handle);
                info!(
                    backend = self.dialect.name(),
                    host = %self.config.host,
                    database = %self.config.database,
                    "Connected"
                );
                Ok(())
            }
            Err(err) => {
                self.handle = None;
                Err(connect_failed(err).into())
            }
        }
    }

    /// Closes the connection. Does nothing when already disconnected.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::CloseFailed`] when the driver fails to close.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.close().await.map_err(ConnectionError::CloseFailed)?;
            info!(database = %self.config.database, "Disconnected");
        }
        Ok(())
    }

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotConnected`], or the backend's refusal.
    pub async fn begin(&mut self) -> Result<()> {
        let sql = self.dialect.begin_sql();
        self.run_raw(sql).await
    }

    /// Commits the current transaction.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotConnected`], or the backend's refusal.
    pub async fn commit(&mut self) -> Result<()> {
        self.run_raw("COMMIT").await
    }

    /// Rolls back the current transaction.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotConnected`], or the backend's refusal.
    pub async fn rollback(&mut self) -> Result<()> {
        self.run_raw("ROLLBACK").await
    }

    async fn run_raw(&mut self, sql: &str) -> Result<()> {
        let handle = self.handle_mut()?;
        debug!(sql = %sql, "Executing SQL");
        handle
            .run_raw(sql)
            .await
            .map_err(|source| StatementError::ExecFailed {
                query: sql.to_string(),
                source,
            })?;
        Ok(())
    }

    pub(crate) fn handle_mut(&mut self) -> Result<&mut Handle> {
        self.handle
            .as_mut()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }
}

async fn port_open(host: &str, port: u16) -> bool {
    let probe = tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await;
    let open = matches!(probe, Ok(Ok(_)));
    debug!(host = %host, port = port, open = open, "Port probe");
    open
}

fn connect_failed(err: sqlx::Error) -> ConnectionError {
    match &err {
        sqlx::Error::Database(db) => ConnectionError::ConnectFailed {
            code: db.code().map(|code| code.into_owned()),
            message: db.message().to_string(),
        },
        other => ConnectionError::ConnectFailed {
            code: None,
            message: other.to_string(),
        },
    }
}
