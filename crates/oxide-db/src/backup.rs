//! SQL text backups.
//!
//! A backup is one script holding every table's `CREATE TABLE` statement
//! followed by one `INSERT` per row. Files are named by the unix time they
//! were taken at and are never overwritten.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::dialect::Dialect;
use crate::error::{IoError, Result};
use crate::layout::BACKUP_EXTENSION;
use crate::value::Row;
use crate::Database;

/// Renders the `INSERT` statement for one row.
fn insert_statement(dialect: &dyn Dialect, table: &str, row: &Row) -> String {
    let columns: Vec<String> = row
        .columns()
        .map(|column| dialect.quote_identifier(column))
        .collect();
    let values: Vec<String> = row
        .values()
        .map(|value| value.to_sql_literal(dialect))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        dialect.quote_identifier(table),
        columns.join(", "),
        values.join(", ")
    )
}

/// True when the script holds anything besides comments and blank lines.
fn has_statements(script: &str) -> bool {
    script.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with("--")
    })
}

impl Database {
    /// Writes a backup of every table to `<root>/backup/<unix-seconds>.sql`
    /// and returns its path.
    ///
    /// # Errors
    ///
    /// Any statement error while reading the tables, or
    /// [`IoError::WriteFailed`] when the file cannot be created.
    pub async fn backup(&mut self) -> Result<PathBuf> {
        let tables = self.connection.tables().await?;
        let taken_at = Utc::now();

        let mut script = String::new();
        script.push_str(&format!(
            "-- {} backup of '{}'\n-- Taken at {}\n",
            self.dialect().name(),
            self.connection.config().database,
            taken_at.to_rfc3339()
        ));
        if let Some(sql) = self.dialect().foreign_key_checks_sql(false) {
            script.push_str(sql);
            script.push_str(";\n");
        }

        let mut row_count = 0usize;
        for table in &tables {
            let create_statement = self.connection.create_statement(table).await?;
            let indexes = self.connection.index_statements(table).await?;
            let select = format!("SELECT * FROM {}", self.dialect().quote_identifier(table));
            let rows = self.connection.select(&select, &[]).await?;

            script.push_str(&format!("\n-- Table: {table}\n"));
            script.push_str(create_statement.trim_end().trim_end_matches(';'));
            script.push_str(";\n");
            for row in &rows {
                script.push_str(&insert_statement(self.dialect(), table, row));
                script.push('\n');
            }
            for sql in &indexes {
                script.push_str(sql.trim_end().trim_end_matches(';'));
                script.push_str(";\n");
            }
            row_count += rows.len();
        }

        if let Some(sql) = self.dialect().foreign_key_checks_sql(true) {
            script.push_str(sql);
            script.push_str(";\n");
        }

        let dir = self.layout.backup_dir();
        let path = dir.join(format!("{}.{BACKUP_EXTENSION}", taken_at.timestamp()));
        write_new(&dir, &path, &script)?;

        info!(
            path = %path.display(),
            tables = tables.len(),
            rows = row_count,
            "Backup written"
        );
        Ok(path)
    }

    /// Replaces the database contents with a backup.
    ///
    /// Uses `file`, or the most recently created backup when `None`. Every
    /// existing table is dropped before the script is replayed. Nothing is
    /// rolled back if the replay fails halfway.
    ///
    /// # Errors
    ///
    /// [`IoError::NotFound`] when there is no backup to read, and any
    /// statement error while dropping tables or replaying the script.
    pub async fn restore(&mut self, file: Option<&Path>) -> Result<PathBuf> {
        let path = match file {
            Some(path) => path.to_path_buf(),
            None => self.layout.latest_backup()?,
        };
        let script = fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                IoError::NotFound(path.clone())
            } else {
                IoError::ReadFailed {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        let tables = self.connection.tables().await?;
        if let Some(sql) = self.dialect().foreign_key_checks_sql(false) {
            self.connection.execute_script(sql).await?;
        }
        for table in &tables {
            let sql = self.dialect().drop_table_sql(table);
            self.connection.execute(&sql, &[]).await?;
        }
        if let Some(sql) = self.dialect().foreign_key_checks_sql(true) {
            self.connection.execute_script(sql).await?;
        }
        info!(dropped = tables.len(), "Existing tables dropped");

        if has_statements(&script) {
            self.connection.execute_script(&script).await?;
        } else {
            warn!(path = %path.display(), "Backup holds no statements");
        }

        info!(path = %path.display(), "Restore finished");
        Ok(path)
    }
}

fn write_new(dir: &Path, path: &Path, contents: &str) -> Result<()> {
    let write_failed = |source: std::io::Error| IoError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(write_failed)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(write_failed)?;
    file.write_all(contents.as_bytes()).map_err(write_failed)?;
    file.sync_all().map_err(write_failed)?;
    Ok(())
}
