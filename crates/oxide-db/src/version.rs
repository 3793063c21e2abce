//! Schema version tracking.
//!
//! The live schema version is the single row of the `version` table. It is
//! the only authority on which snapshot describes the database.

use tracing::info;

use crate::ddl::{ColumnDef, DdlBuilder, Modifier, TableDef};
use crate::error::{Result, SchemaError};
use crate::value::Value;
use crate::Database;

/// Name of the version table and of its single column.
pub const VERSION_TABLE: &str = "version";

/// Definition of the version table.
#[must_use]
pub fn version_table() -> TableDef {
    TableDef::new(VERSION_TABLE).column(
        ColumnDef::new(VERSION_TABLE, "BIGINT(10)")
            .modifier(Modifier::Unsigned)
            .modifier(Modifier::PrimaryKey),
    )
}

impl Database {
    /// Creates the version table if it is missing and seeds it with
    /// `initial` if it has no row. Returns the resulting version.
    ///
    /// # Errors
    ///
    /// Any statement error, or [`SchemaError::InvalidVersion`] for an
    /// unreadable stored version.
    pub async fn install_version_table(&mut self, initial: i64) -> Result<i64> {
        if !self.connection.table_exists(VERSION_TABLE).await? {
            let sql = DdlBuilder::new(self.dialect()).create_table(&version_table())?;
            self.connection.execute(&sql, &[]).await?;
            info!(table = VERSION_TABLE, "Version table created");
        }

        match self.current_version().await {
            Ok(version) => Ok(version),
            Err(crate::Error::Schema(SchemaError::NoVersionRow)) => {
                self.insert_version(initial).await?;
                info!(version = initial, "Version table seeded");
                Ok(initial)
            }
            Err(err) => Err(err),
        }
    }

    /// Reads the live schema version.
    ///
    /// # Errors
    ///
    /// [`SchemaError::NoVersionRow`] when the table is empty,
    /// [`SchemaError::InvalidVersion`] when the value is not an integer, and
    /// any statement error.
    pub async fn current_version(&mut self) -> Result<i64> {
        let sql = {
            let dialect = self.dialect();
            format!(
                "SELECT {} FROM {} LIMIT 1",
                dialect.quote_identifier(VERSION_TABLE),
                dialect.quote_identifier(VERSION_TABLE)
            )
        };
        let rows = self.connection.select(&sql, &[]).await?;
        let value = rows
            .first()
            .and_then(|row| row.get_index(0))
            .ok_or(SchemaError::NoVersionRow)?;
        value.as_i64().ok_or_else(|| {
            let shown = value
                .as_text()
                .map_or_else(|| "NULL".to_string(), |text| text.into_owned());
            SchemaError::InvalidVersion(shown).into()
        })
    }

    /// Replaces the stored version.
    ///
    /// # Errors
    ///
    /// Any statement error.
    pub async fn set_version(&mut self, version: i64) -> Result<()> {
        let sql = format!(
            "DELETE FROM {}",
            self.dialect().quote_identifier(VERSION_TABLE)
        );
        self.connection.delete(&sql, &[]).await?;
        self.insert_version(version).await?;
        info!(version = version, "Schema version set");
        Ok(())
    }

    async fn insert_version(&mut self, version: i64) -> Result<()> {
        let quoted = self.dialect().quote_identifier(VERSION_TABLE);
        let sql = format!("INSERT INTO {quoted} ({quoted}) VALUES (?)");
        self.connection.execute(&sql, &[Value::Int(version)]).await?;
        Ok(())
    }
}
