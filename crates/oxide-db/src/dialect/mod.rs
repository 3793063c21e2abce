//! Database dialect implementations.
//!
//! Each dialect knows how to quote, which catalog queries describe a live
//! schema, and how DDL is spelled on that backend. Everything above the
//! connection (DDL builder, snapshots, migrations, backups) talks to the
//! backend only through [`Dialect`].

mod mysql;
mod sqlite;

pub use mysql::MySqlDialect;
pub use sqlite::SqliteDialect;

use crate::ddl::{ColumnDef, Modifier, UniqueKey};
use crate::snapshot::ColumnMeta;
use crate::value::Row;

/// Trait for backend-specific SQL.
pub trait Dialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Port probed before connecting, if the backend listens on one.
    fn default_port(&self) -> Option<u16>;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quote a string literal.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// SQL for a whitelisted modifier, `None` when the backend has no
    /// equivalent and the modifier must be left out.
    fn modifier_sql(&self, modifier: &Modifier) -> Option<String> {
        Some(modifier.to_string())
    }

    /// Generates column definition SQL.
    fn column_definition(&self, column: &ColumnDef) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            column.sql_type.clone(),
        ];
        parts.extend(
            column
                .modifiers
                .iter()
                .filter_map(|modifier| self.modifier_sql(modifier)),
        );
        parts.join(" ")
    }

    /// Trailing clause appended after the closing parenthesis of `CREATE TABLE`.
    fn create_table_suffix(&self) -> &'static str;

    /// Unique key clause inside `CREATE TABLE`.
    fn unique_key_clause(&self, key: &UniqueKey) -> String;

    /// `ALTER TABLE .. ADD COLUMN ..`.
    fn add_column_sql(&self, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)
        )
    }

    /// `ALTER TABLE .. MODIFY ..`, `None` if the backend cannot change a
    /// column in place.
    fn modify_column_sql(&self, table: &str, column: &ColumnDef) -> Option<String>;

    /// `ALTER TABLE .. DROP COLUMN ..`.
    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Adds a unique key to an existing table.
    fn add_unique_key_sql(&self, table: &str, key: &UniqueKey) -> String;

    /// `DROP TABLE ..`.
    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(table))
    }

    /// Removes every row of a table.
    fn truncate_table_sql(&self, table: &str) -> String;

    /// Lists user tables, one per row, table name in the first column.
    fn list_tables_sql(&self) -> String;

    /// Fetches the `CREATE TABLE` text of one table.
    fn create_statement_sql(&self, table: &str) -> String;

    /// Column of [`Self::create_statement_sql`] holding the statement.
    fn create_statement_column(&self) -> &'static str;

    /// Lists the statements recreating a table's secondary indexes, one per
    /// row in the first column. `None` when the `CREATE TABLE` text already
    /// carries every index.
    fn index_statements_sql(&self, _table: &str) -> Option<String> {
        None
    }

    /// Describes the columns of one table, one row per column in catalog order.
    fn describe_columns_sql(&self, table: &str) -> String;

    /// Converts a row of [`Self::describe_columns_sql`] into column metadata.
    fn column_meta(&self, row: &Row) -> ColumnMeta;

    /// Statement opening a transaction.
    fn begin_sql(&self) -> &'static str {
        "BEGIN"
    }

    /// Statement toggling foreign key enforcement, if the backend needs it
    /// for bulk drops and restores.
    fn foreign_key_checks_sql(&self, _enabled: bool) -> Option<&'static str> {
        None
    }
}
