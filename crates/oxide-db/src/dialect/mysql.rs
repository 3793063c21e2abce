//! MySQL / MariaDB dialect.

use crate::ddl::{ColumnDef, UniqueKey};
use crate::snapshot::ColumnMeta;
use crate::value::Row;

use super::Dialect;

/// MySQL dialect.
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
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

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn default_port(&self) -> Option<u16> {
        Some(3306)
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn create_table_suffix(&self) -> &'static str {
        " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    }

    fn unique_key_clause(&self, key: &UniqueKey) -> String {
        format!(
            "UNIQUE KEY {} ({})",
            self.quote_identifier(&key.name),
            self.column_list(&key.columns)
        )
    }

    fn modify_column_sql(&self, table: &str, column: &ColumnDef) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} MODIFY {}",
            self.quote_identifier(table),
            self.column_definition(column)
        ))
    }

    fn add_unique_key_sql(&self, table: &str, key: &UniqueKey) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.unique_key_clause(key)
        )
    }

    fn truncate_table_sql(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.quote_identifier(table))
    }

    fn list_tables_sql(&self) -> String {
        "SHOW TABLES".to_string()
    }

    fn create_statement_sql(&self, table: &str) -> String {
        format!("SHOW CREATE TABLE {}", self.quote_identifier(table))
    }

    fn create_statement_column(&self) -> &'static str {
        "Create Table"
    }

    fn describe_columns_sql(&self, table: &str) -> String {
        format!("SHOW COLUMNS FROM {}", self.quote_identifier(table))
    }

    fn column_meta(&self, row: &Row) -> ColumnMeta {
        ColumnMeta {
            field: row.text("Field").unwrap_or_default(),
            column_type: row.text("Type").unwrap_or_default(),
            null: row.text("Null").unwrap_or_else(|| "YES".to_string()),
            default: row.text("Default"),
            key: row.text("Key").unwrap_or_default(),
            extra: row.text("Extra").unwrap_or_default(),
        }
    }

    fn begin_sql(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn foreign_key_checks_sql(&self, enabled: bool) -> Option<&'static str> {
        Some(if enabled {
            "SET FOREIGN_KEY_CHECKS=1"
        } else {
            "SET FOREIGN_KEY_CHECKS=0"
        })
    }
}
