//! Catalog introspection: which tables exist and what they look like.

use crate::connection::Connection;
use crate::error::{Result, SchemaError};
use crate::snapshot::ColumnMeta;

impl Connection {
    /// Names of all user tables, sorted.
    ///
    /// # Errors
    ///
    /// Any statement error of the catalog query.
    pub async fn tables(&mut self) -> Result<Vec<String>> {
        let sql = self.dialect().list_tables_sql();
        let rows = self.select(&sql, &[]).await?;
        let mut tables: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get_index(0))
            .filter_map(|value| value.as_text().map(|name| name.into_owned()))
            .collect();
        tables.sort();
        Ok(tables)
    }

    /// Returns true when the table exists.
    ///
    /// # Errors
    ///
    /// Any statement error of the catalog query.
    pub async fn table_exists(&mut self, table: &str) -> Result<bool> {
        Ok(self.tables().await?.iter().any(|name| name == table))
    }

    /// The `CREATE TABLE` statement the backend reports for a table.
    ///
    /// # Errors
    ///
    /// [`SchemaError::TableNotFound`] when the backend reports no statement.
    pub async fn create_statement(&mut self, table: &str) -> Result<String> {
        let sql = self.dialect().create_statement_sql(table);
        let column = self.dialect().create_statement_column();
        let rows = self.select(&sql, &[]).await?;
        rows.first()
            .and_then(|row| row.text(column))
            .ok_or_else(|| SchemaError::TableNotFound(table.to_string()).into())
    }

    /// Statements recreating the table's secondary indexes, in name order.
    /// Empty when the backend keeps indexes inside the `CREATE TABLE` text.
    ///
    /// # Errors
    ///
    /// Any statement error of the catalog query.
    pub async fn index_statements(&mut self, table: &str) -> Result<Vec<String>> {
        let Some(sql) = self.dialect().index_statements_sql(table) else {
            return Ok(Vec::new());
        };
        let rows = self.select(&sql, &[]).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get_index(0))
            .filter_map(|value| value.as_text().map(|sql| sql.into_owned()))
            .collect())
    }

    /// Column metadata of a table, in catalog order.
    ///
    /// # Errors
    ///
    /// Any statement error of the catalog query.
    pub async fn columns(&mut self, table: &str) -> Result<Vec<ColumnMeta>> {
        let sql = self.dialect().describe_columns_sql(table);
        let rows = self.select(&sql, &[]).await?;
        let dialect = self.dialect();
        Ok(rows.iter().map(|row| dialect.column_meta(row)).collect())
    }
}
