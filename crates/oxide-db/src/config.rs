//! Connection configuration.
//!
//! A [`DatabaseConfig`] is handed to [`Database::new`](crate::Database::new)
//! explicitly; there are no process-wide connection defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dialect::{Dialect, MySqlDialect, SqliteDialect};
use crate::error::{ConnectionError, IoError, Result};

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// MySQL or MariaDB.
    #[default]
    MySql,
    /// SQLite.
    Sqlite,
}

impl Backend {
    /// Returns the dialect for this backend.
    #[must_use]
    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::MySql => Box::new(MySqlDialect::new()),
            Self::Sqlite => Box::new(SqliteDialect::new()),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// What DDL operations do when the database rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DdlPolicy {
    /// Every failure is returned as an error.
    #[default]
    Strict,
    /// Failures are logged and reported as `Ok(false)` until more than
    /// `max_failures` have happened on this connection; from then on they
    /// are returned as errors.
    Tolerant {
        /// Failures tolerated before raising.
        max_failures: u32,
    },
}

/// Connection parameters and on-disk layout root.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Backend to connect to.
    pub backend: Backend,
    /// Server host.
    pub host: String,
    /// Server port; the dialect default when absent.
    pub port: Option<u16>,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Database (schema) name, or the file path / `:memory:` for SQLite.
    pub database: String,
    /// Directory holding `schema/` and `backup/`.
    pub root: PathBuf,
    /// Failure handling for DDL operations.
    pub ddl_policy: DdlPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::MySql,
            host: "localhost".to_string(),
            port: None,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            root: PathBuf::from("."),
            ddl_policy: DdlPolicy::Strict,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("root", &self.root)
            .field("ddl_policy", &self.ddl_policy)
            .finish()
    }
}

impl DatabaseConfig {
    /// MySQL configuration.
    #[must_use]
    pub fn mysql(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            backend: Backend::MySql,
            host: host.into(),
            username: username.into(),
            password: password.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// SQLite configuration for a file path or `:memory:`.
    #[must_use]
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            backend: Backend::Sqlite,
            database: path.into(),
            ..Self::default()
        }
    }

    /// Sets the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the layout root.
    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Sets the DDL failure policy.
    #[must_use]
    pub fn ddl_policy(mut self, policy: DdlPolicy) -> Self {
        self.ddl_policy = policy;
        self
    }

    /// Sets a field by name (`backend`, `host`, `port`, `username`,
    /// `password`, `database`, `root`).
    ///
    /// # Errors
    ///
    /// [`ConnectionError::InvalidConfig`] for an unknown key or a value that
    /// does not parse.
    pub fn set(mut self, key: &str, value: impl Into<String>) -> std::result::Result<Self, ConnectionError> {
        let value = value.into();
        match key {
            "backend" => self.backend = value.parse().map_err(ConnectionError::InvalidConfig)?,
            "host" => self.host = value,
            "port" => {
                self.port = Some(value.parse().map_err(|_| {
                    ConnectionError::InvalidConfig(format!("invalid port '{value}'"))
                })?);
            }
            "username" => self.username = value,
            "password" => self.password = value,
            "database" => self.database = value,
            "root" => self.root = PathBuf::from(value),
            other => {
                return Err(ConnectionError::InvalidConfig(format!(
                    "unknown setting '{other}'"
                )))
            }
        }
        Ok(self)
    }

    /// Port probed before connecting: the configured one, else the dialect
    /// default. `None` means no probe.
    #[must_use]
    pub fn probe_port(&self, dialect: &dyn Dialect) -> Option<u16> {
        dialect.default_port().map(|default| self.port.unwrap_or(default))
    }

    /// Builds the driver connection URL.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::InvalidConfig`] when a field cannot be placed in a URL.
    pub fn url(&self) -> std::result::Result<String, ConnectionError> {
        match self.backend {
            Backend::Sqlite => {
                if self.database.is_empty() || self.database == ":memory:" {
                    Ok("sqlite::memory:".to_string())
                } else {
                    Ok(format!("sqlite://{}?mode=rwc", self.database))
                }
            }
            Backend::MySql => {
                let invalid = |what: &str| ConnectionError::InvalidConfig(what.to_string());
                let mut url = Url::parse("mysql://localhost")
                    .map_err(|e| ConnectionError::InvalidConfig(e.to_string()))?;
                url.set_host(Some(&self.host))
                    .map_err(|e| ConnectionError::InvalidConfig(format!("host: {e}")))?;
                url.set_port(self.port).map_err(|()| invalid("port"))?;
                if !self.username.is_empty() {
                    url.set_username(&self.username)
                        .map_err(|()| invalid("username"))?;
                }
                if !self.password.is_empty() {
                    url.set_password(Some(&self.password))
                        .map_err(|()| invalid("password"))?;
                }
                url.set_path(&self.database);
                Ok(url.into())
            }
        }
    }

    /// Loads a configuration file (JSON).
    ///
    /// # Errors
    ///
    /// [`IoError::NotFound`], [`IoError::ReadFailed`] or [`IoError::Malformed`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                IoError::NotFound(path.to_path_buf())
            } else {
                IoError::ReadFailed {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let config = serde_json::from_str(&text).map_err(|source| IoError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// [`IoError::WriteFailed`] when the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).map_err(|source| IoError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| IoError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}
