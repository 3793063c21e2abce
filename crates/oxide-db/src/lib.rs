//! Relational database access with a schema lifecycle.
//!
//! `oxide-db` sits on top of a single SQL connection and provides:
//! - Parameterized statements with a fixed value-to-wire-type mapping
//! - DDL generation from declarative table and column descriptions, with a
//!   whitelist of column modifiers
//! - Versioned schema snapshots stored as JSON files
//! - Snapshot-driven upgrades that diff two snapshots and apply the result
//! - Full backups as SQL scripts, and restore from them
//!
//! # Architecture
//!
//! - **Connection** - Owns the driver handle, transactions
//! - **Executor** - Prepare, bind, execute; rows, affected counts, insert ids
//! - **DDL** - `CREATE`/`ALTER`/`DROP`/`TRUNCATE` generation
//! - **Snapshot** - Live catalog capture and the snapshot store
//! - **Migrate** - Diff between snapshots and upgrade
//! - **Backup** - SQL text backup and restore
//! - **Dialect** - Backend-specific SQL (MySQL, SQLite)
//!
//! # Example
//!
//! ```rust,no_run
//! use oxide_db::prelude::*;
//!
//! # async fn run() -> oxide_db::Result<()> {
//! let config = DatabaseConfig::mysql("localhost", "app", "secret", "app").root("/var/lib/app");
//! let mut db = Database::new(config);
//! db.connect().await?;
//! db.install_version_table(1).await?;
//!
//! db.create_table(
//!     &TableDef::new("users")
//!         .column(ColumnDef::new("id", "BIGINT(10)").extra(&["UNSIGNED", "PRIMARY KEY", "AUTO_INCREMENT"]))
//!         .column(ColumnDef::new("username", "VARCHAR(60)").extra(&["NOT NULL"]))
//!         .unique_key(UniqueKey::new("uq_username", vec!["username".into()])),
//! )
//! .await?;
//!
//! let id = db
//!     .insert("INSERT INTO users (username) VALUES (?)", &["alice".into()])
//!     .await?;
//! let rows = db
//!     .select("SELECT * FROM users WHERE id = ?", &[id.into()])
//!     .await?;
//! assert_eq!(rows.len(), 1);
//!
//! db.capture().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Create the version table
//! oxide-db install
//!
//! # Store a snapshot of the live schema
//! oxide-db snapshot
//!
//! # Show what an upgrade between two stored snapshots would do
//! oxide-db plan --from 1 --to 2
//!
//! # Upgrade to the latest snapshot
//! oxide-db upgrade
//!
//! # Back up, then restore the latest backup
//! oxide-db backup
//! oxide-db restore
//! ```

pub mod backup;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod ddl;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod layout;
pub mod migrate;
pub mod snapshot;
pub mod value;
pub mod version;

pub use config::{Backend, DatabaseConfig, DdlPolicy};
pub use connection::Connection;
pub use error::{ConnectionError, Error, IoError, Result, SchemaError, StatementError};
pub use executor::PreparedResult;
pub use value::{Row, Value, WireType};

use dialect::Dialect;
use layout::Layout;
use snapshot::ColumnMeta;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{Backend, DatabaseConfig, DdlPolicy};
    pub use crate::ddl::{AlterAction, AlterEntry, ColumnDef, DdlBuilder, Modifier, TableDef, UniqueKey};
    pub use crate::dialect::{Dialect, MySqlDialect, SqliteDialect};
    pub use crate::error::{Error, Result};
    pub use crate::migrate::{plan, MigrationKind, MigrationPlan, MigrationStep};
    pub use crate::snapshot::{ColumnMeta, Snapshot, SnapshotStore, TableSnapshot};
    pub use crate::value::{Row, Value};
    pub use crate::Database;
}

/// A connection together with its snapshot and backup directories.
///
/// Not meant to be shared between tasks: operations take `&mut self` and run
/// one at a time.
pub struct Database {
    connection: Connection,
    layout: Layout,
    policy: DdlPolicy,
    ddl_failures: u32,
}

impl Database {
    /// Creates a disconnected database handle.
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        let layout = Layout::new(config.root.clone());
        let policy = config.ddl_policy;
        Self {
            connection: Connection::new(config),
            layout,
            policy,
            ddl_failures: 0,
        }
    }

    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns the underlying connection mutably.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Returns the directory layout.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.connection.dialect()
    }

    /// Number of DDL failures tolerated so far.
    #[must_use]
    pub const fn ddl_failures(&self) -> u32 {
        self.ddl_failures
    }

    /// Connects.
    ///
    /// # Errors
    ///
    /// See [`Connection::connect`].
    pub async fn connect(&mut self) -> Result<()> {
        self.connection.connect().await
    }

    /// Disconnects.
    ///
    /// # Errors
    ///
    /// See [`Connection::disconnect`].
    pub async fn disconnect(&mut self) -> Result<()> {
        self.connection.disconnect().await
    }

    /// Returns true while connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// See [`Connection::begin`].
    pub async fn begin(&mut self) -> Result<()> {
        self.connection.begin().await
    }

    /// Commits the current transaction.
    ///
    /// # Errors
    ///
    /// See [`Connection::commit`].
    pub async fn commit(&mut self) -> Result<()> {
        self.connection.commit().await
    }

    /// Rolls back the current transaction.
    ///
    /// # Errors
    ///
    /// See [`Connection::rollback`].
    pub async fn rollback(&mut self) -> Result<()> {
        self.connection.rollback().await
    }

    /// See [`Connection::execute`].
    ///
    /// # Errors
    ///
    /// See [`Connection::execute`].
    pub async fn execute(&mut self, query: &str, params: &[Value]) -> Result<PreparedResult> {
        self.connection.execute(query, params).await
    }

    /// See [`Connection::select`].
    ///
    /// # Errors
    ///
    /// See [`Connection::select`].
    pub async fn select(&mut self, query: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.connection.select(query, params).await
    }

    /// See [`Connection::insert`].
    ///
    /// # Errors
    ///
    /// See [`Connection::insert`].
    pub async fn insert(&mut self, query: &str, params: &[Value]) -> Result<i64> {
        self.connection.insert(query, params).await
    }

    /// See [`Connection::update`].
    ///
    /// # Errors
    ///
    /// See [`Connection::update`].
    pub async fn update(&mut self, query: &str, params: &[Value]) -> Result<u64> {
        self.connection.update(query, params).await
    }

    /// See [`Connection::delete`].
    ///
    /// # Errors
    ///
    /// See [`Connection::delete`].
    pub async fn delete(&mut self, query: &str, params: &[Value]) -> Result<u64> {
        self.connection.delete(query, params).await
    }

    /// See [`Connection::execute_script`].
    ///
    /// # Errors
    ///
    /// See [`Connection::execute_script`].
    pub async fn execute_script(&mut self, script: &str) -> Result<u64> {
        self.connection.execute_script(script).await
    }

    /// See [`Connection::tables`].
    ///
    /// # Errors
    ///
    /// See [`Connection::tables`].
    pub async fn tables(&mut self) -> Result<Vec<String>> {
        self.connection.tables().await
    }

    /// See [`Connection::table_exists`].
    ///
    /// # Errors
    ///
    /// See [`Connection::table_exists`].
    pub async fn table_exists(&mut self, table: &str) -> Result<bool> {
        self.connection.table_exists(table).await
    }

    /// See [`Connection::create_statement`].
    ///
    /// # Errors
    ///
    /// See [`Connection::create_statement`].
    pub async fn create_statement(&mut self, table: &str) -> Result<String> {
        self.connection.create_statement(table).await
    }

    /// See [`Connection::index_statements`].
    ///
    /// # Errors
    ///
    /// See [`Connection::index_statements`].
    pub async fn index_statements(&mut self, table: &str) -> Result<Vec<String>> {
        self.connection.index_statements(table).await
    }

    /// See [`Connection::columns`].
    ///
    /// # Errors
    ///
    /// See [`Connection::columns`].
    pub async fn columns(&mut self, table: &str) -> Result<Vec<ColumnMeta>> {
        self.connection.columns(table).await
    }
}
