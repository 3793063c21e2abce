//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support: there is no in-place column
//! modification, unique keys are expressed as unique indexes, and there is
//! no `TRUNCATE`.

use crate::ddl::{ColumnDef, Modifier, UniqueKey};
use crate::snapshot::ColumnMeta;
use crate::value::Row;

use super::Dialect;

/// SQLite dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn default_port(&self) -> Option<u16> {
        None
    }

    fn modifier_sql(&self, modifier: &Modifier) -> Option<String> {
        match modifier {
            Modifier::Unsigned => None,
            Modifier::AutoIncrement => Some("AUTOINCREMENT".to_string()),
            other => Some(other.to_string()),
        }
    }

    fn create_table_suffix(&self) -> &'static str {
        ""
    }

    fn unique_key_clause(&self, key: &UniqueKey) -> String {
        format!(
            "CONSTRAINT {} UNIQUE ({})",
            self.quote_identifier(&key.name),
            self.column_list(&key.columns)
        )
    }

    fn modify_column_sql(&self, _table: &str, _column: &ColumnDef) -> Option<String> {
        None
    }

    fn add_unique_key_sql(&self, table: &str, key: &UniqueKey) -> String {
        format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            self.quote_identifier(&key.name),
            self.quote_identifier(table),
            self.column_list(&key.columns)
        )
    }

    fn truncate_table_sql(&self, table: &str) -> String {
        format!("DELETE FROM {}", self.quote_identifier(table))
    }

    fn list_tables_sql(&self) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            .to_string()
    }

    fn create_statement_sql(&self, table: &str) -> String {
        format!(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = {}",
            self.quote_literal(table)
        )
    }

    fn create_statement_column(&self) -> &'static str {
        "sql"
    }

    fn index_statements_sql(&self, table: &str) -> Option<String> {
        // indexes backing inline constraints have no sql of their own
        Some(format!(
            "SELECT sql FROM sqlite_master WHERE type = 'index' AND tbl_name = {} AND sql IS NOT NULL ORDER BY name",
            self.quote_literal(table)
        ))
    }

    fn describe_columns_sql(&self, table: &str) -> String {
        format!("PRAGMA table_info({})", self.quote_identifier(table))
    }

    fn column_meta(&self, row: &Row) -> ColumnMeta {
        let not_null = row.get("notnull").and_then(|v| v.as_i64()).unwrap_or(0) != 0;
        let primary = row.get("pk").and_then(|v| v.as_i64()).unwrap_or(0) > 0;
        ColumnMeta {
            field: row.text("name").unwrap_or_default(),
            column_type: row.text("type").unwrap_or_default(),
            null: if not_null || primary { "NO" } else { "YES" }.to_string(),
            default: row.text("dflt_value"),
            key: if primary { "PRI" } else { "" }.to_string(),
            extra: String::new(),
        }
    }
}
