//! DDL generation.
//!
//! Callers describe tables and alterations declaratively ([`TableDef`],
//! [`AlterEntry`]); [`DdlBuilder`] turns them into SQL for a given dialect.
//! Column modifiers are drawn from a fixed whitelist ([`Modifier`]) and
//! anything else a caller supplies is dropped before it can reach the SQL.
//!
//! The builder performs no existence checks. Those belong to the caller.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::config::DdlPolicy;
use crate::dialect::Dialect;
use crate::error::{Result, SchemaError};
use crate::Database;

/// Longest identifier accepted (MySQL limit).
const MAX_IDENTIFIER_LEN: usize = 64;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier regex"));

static SQL_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^
        [A-Za-z][A-Za-z0-9_]*(?:\s+[A-Za-z][A-Za-z0-9_]*)*
        (?:\s*\(\s*(?:
            \d+(?:\s*,\s*\d+)?
            | '(?:[^'\\]|''|\\.)*'(?:\s*,\s*'(?:[^'\\]|''|\\.)*')*
        )\s*\))?
        (?:\s+[A-Za-z][A-Za-z0-9_]*)*
        $",
    )
    .expect("type regex")
});

static DEFAULT_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:NULL|CURRENT_TIMESTAMP|[+-]?\d+(?:\.\d+)?|'(?:[^'\\]|''|\\.)*')$")
        .expect("default regex")
});

/// Returns true for a name the builder accepts as a table, column or key name.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER.is_match(name)
}

/// Returns true when the text looks like a SQL column type.
#[must_use]
pub fn is_valid_sql_type(sql_type: &str) -> bool {
    SQL_TYPE.is_match(sql_type.trim())
}

/// Whitelisted column modifier.
///
/// The derived ordering is the emission order in generated SQL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modifier {
    /// `UNSIGNED`
    Unsigned,
    /// `NOT NULL`
    NotNull,
    /// `NULL`
    Null,
    /// `DEFAULT <literal>`
    Default(String),
    /// `PRIMARY KEY`
    PrimaryKey,
    /// `AUTO_INCREMENT`
    AutoIncrement,
    /// `UNIQUE`
    Unique,
}

impl Modifier {
    /// Parses a caller-supplied modifier string.
    ///
    /// Keywords are matched case-insensitively with whitespace normalised.
    /// Returns `None` for anything outside the whitelist, including a
    /// `DEFAULT` whose value is not a plain literal.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let upper = normalized.to_ascii_uppercase();
        match upper.as_str() {
            "UNSIGNED" => Some(Self::Unsigned),
            "NOT NULL" => Some(Self::NotNull),
            "NULL" => Some(Self::Null),
            "PRIMARY KEY" => Some(Self::PrimaryKey),
            "AUTO_INCREMENT" | "AUTOINCREMENT" => Some(Self::AutoIncrement),
            "UNIQUE" => Some(Self::Unique),
            _ if upper.starts_with("DEFAULT ") => {
                let literal = text.trim()["DEFAULT".len()..].trim();
                if !DEFAULT_LITERAL.is_match(literal) {
                    return None;
                }
                let upper_literal = literal.to_ascii_uppercase();
                if upper_literal == "NULL" || upper_literal == "CURRENT_TIMESTAMP" {
                    Some(Self::Default(upper_literal))
                } else {
                    Some(Self::Default(literal.to_string()))
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned => write!(f, "UNSIGNED"),
            Self::NotNull => write!(f, "NOT NULL"),
            Self::Null => write!(f, "NULL"),
            Self::Default(literal) => write!(f, "DEFAULT {literal}"),
            Self::PrimaryKey => write!(f, "PRIMARY KEY"),
            Self::AutoIncrement => write!(f, "AUTO_INCREMENT"),
            Self::Unique => write!(f, "UNIQUE"),
        }
    }
}

/// Parses modifier strings, dropping anything outside the whitelist.
fn parse_modifiers<S: AsRef<str>>(extra: &[S]) -> BTreeSet<Modifier> {
    extra
        .iter()
        .filter_map(|raw| {
            let parsed = Modifier::parse(raw.as_ref());
            if parsed.is_none() {
                debug!(modifier = %raw.as_ref(), "Dropping unknown column modifier");
            }
            parsed
        })
        .collect()
}

/// A column in a table description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Raw SQL type including size, e.g. `VARCHAR(60)`.
    pub sql_type: String,
    /// Modifiers, emitted in canonical order.
    pub modifiers: BTreeSet<Modifier>,
}

impl ColumnDef {
    /// Creates a column without modifiers.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            modifiers: BTreeSet::new(),
        }
    }

    /// Adds a modifier.
    #[must_use]
    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.insert(modifier);
        self
    }

    /// Adds caller-supplied modifier strings. Unknown ones are dropped.
    #[must_use]
    pub fn extra<S: AsRef<str>>(mut self, extra: &[S]) -> Self {
        self.modifiers.extend(parse_modifiers(extra));
        self
    }

    /// Shorthand for `NOT NULL`.
    #[must_use]
    pub fn not_null(self) -> Self {
        self.modifier(Modifier::NotNull)
    }

    /// Shorthand for `PRIMARY KEY`.
    #[must_use]
    pub fn primary_key(self) -> Self {
        self.modifier(Modifier::PrimaryKey)
    }

    fn validate(&self) -> std::result::Result<(), SchemaError> {
        if !is_valid_identifier(&self.name) {
            return Err(SchemaError::InvalidDefinition(format!(
                "invalid column name '{}'",
                self.name
            )));
        }
        if !is_valid_sql_type(&self.sql_type) {
            return Err(SchemaError::InvalidDefinition(format!(
                "invalid type '{}' for column '{}'",
                self.sql_type, self.name
            )));
        }
        Ok(())
    }
}

/// A named unique key over an ordered column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    /// Key name.
    pub name: String,
    /// Covered columns, in order.
    pub columns: Vec<String>,
}

impl UniqueKey {
    /// Creates a unique key.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    fn validate(&self) -> std::result::Result<(), SchemaError> {
        if !is_valid_identifier(&self.name) {
            return Err(SchemaError::InvalidDefinition(format!(
                "invalid key name '{}'",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(SchemaError::InvalidDefinition(format!(
                "unique key '{}' has no columns",
                self.name
            )));
        }
        if let Some(bad) = self.columns.iter().find(|c| !is_valid_identifier(c)) {
            return Err(SchemaError::InvalidDefinition(format!(
                "invalid column '{bad}' in unique key '{}'",
                self.name
            )));
        }
        Ok(())
    }
}

/// A table description for `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Columns in emission order.
    pub columns: Vec<ColumnDef>,
    /// Unique keys in emission order.
    pub unique_keys: Vec<UniqueKey>,
}

impl TableDef {
    /// Creates an empty table description.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            unique_keys: Vec::new(),
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Appends a unique key.
    #[must_use]
    pub fn unique_key(mut self, key: UniqueKey) -> Self {
        self.unique_keys.push(key);
        self
    }

    fn validate(&self) -> std::result::Result<(), SchemaError> {
        if !is_valid_identifier(&self.name) {
            return Err(SchemaError::InvalidDefinition(format!(
                "invalid table name '{}'",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(SchemaError::InvalidDefinition(format!(
                "table '{}' has no columns",
                self.name
            )));
        }
        let mut seen = BTreeSet::new();
        for column in &self.columns {
            column.validate()?;
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::InvalidDefinition(format!(
                    "duplicate column '{}' in table '{}'",
                    column.name, self.name
                )));
            }
        }
        for key in &self.unique_keys {
            key.validate()?;
        }
        Ok(())
    }
}

/// Action of an alter entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum AlterAction {
    /// `ADD COLUMN`
    Add,
    /// `MODIFY`
    Modify,
    /// `DROP COLUMN`
    DropColumn,
    /// `ADD UNIQUE KEY`
    AddUniqueKey,
    /// Anything else; skipped by the builder.
    Unsupported(String),
}

impl From<String> for AlterAction {
    fn from(raw: String) -> Self {
        let key = raw
            .split(|c: char| c.is_whitespace() || c == '_')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        match key.as_str() {
            "ADD" | "ADD COLUMN" => Self::Add,
            "MODIFY" => Self::Modify,
            "DROP COLUMN" | "DROP" => Self::DropColumn,
            "ADD UNIQUE KEY" => Self::AddUniqueKey,
            _ => Self::Unsupported(raw),
        }
    }
}

/// One entry of an alter request.
///
/// Deserializes from `{"column", "action", "type"?, "extra"?, "keyName"?,
/// "columns"?}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterEntry {
    /// Column the entry applies to.
    pub column: String,
    /// What to do.
    pub action: AlterAction,
    /// Column type, required by `ADD` and `MODIFY`.
    #[serde(rename = "type", default)]
    pub sql_type: Option<String>,
    /// Modifier strings for `ADD` and `MODIFY`.
    #[serde(default)]
    pub extra: Vec<String>,
    /// Key name, required by `ADD UNIQUE KEY`.
    #[serde(default)]
    pub key_name: Option<String>,
    /// Key columns, required by `ADD UNIQUE KEY`.
    #[serde(default)]
    pub columns: Vec<String>,
}

impl AlterEntry {
    fn with_action(column: impl Into<String>, action: AlterAction) -> Self {
        Self {
            column: column.into(),
            action,
            sql_type: None,
            extra: Vec::new(),
            key_name: None,
            columns: Vec::new(),
        }
    }

    /// `ADD COLUMN column sql_type`.
    #[must_use]
    pub fn add(column: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let mut entry = Self::with_action(column, AlterAction::Add);
        entry.sql_type = Some(sql_type.into());
        entry
    }

    /// `MODIFY column sql_type`.
    #[must_use]
    pub fn modify(column: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let mut entry = Self::with_action(column, AlterAction::Modify);
        entry.sql_type = Some(sql_type.into());
        entry
    }

    /// `DROP COLUMN column`.
    #[must_use]
    pub fn drop_column(column: impl Into<String>) -> Self {
        Self::with_action(column, AlterAction::DropColumn)
    }

    /// `ADD UNIQUE KEY key_name (columns)`.
    #[must_use]
    pub fn add_unique_key(
        column: impl Into<String>,
        key_name: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        let mut entry = Self::with_action(column, AlterAction::AddUniqueKey);
        entry.key_name = Some(key_name.into());
        entry.columns = columns;
        entry
    }

    /// Adds modifier strings.
    #[must_use]
    pub fn extra<S: AsRef<str>>(mut self, extra: &[S]) -> Self {
        self.extra
            .extend(extra.iter().map(|s| s.as_ref().to_string()));
        self
    }

    fn column_def(&self) -> std::result::Result<ColumnDef, SchemaError> {
        let sql_type = self.sql_type.as_deref().ok_or_else(|| {
            SchemaError::InvalidDefinition(format!("column '{}' has no type", self.column))
        })?;
        let column = ColumnDef::new(&self.column, sql_type).extra(&self.extra);
        column.validate()?;
        Ok(column)
    }
}

/// Renders DDL statements for one dialect.
pub struct DdlBuilder<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> DdlBuilder<'d> {
    /// Creates a builder for the given dialect.
    #[must_use]
    pub const fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    /// `CREATE TABLE` with one clause per column in order, then the unique
    /// keys, then the dialect's table suffix.
    ///
    /// # Errors
    ///
    /// [`SchemaError::InvalidDefinition`] when the definition is malformed.
    pub fn create_table(&self, table: &TableDef) -> std::result::Result<String, SchemaError> {
        table.validate()?;

        let clauses: Vec<String> = table
            .columns
            .iter()
            .map(|column| self.dialect.column_definition(column))
            .chain(
                table
                    .unique_keys
                    .iter()
                    .map(|key| self.dialect.unique_key_clause(key)),
            )
            .collect();

        Ok(format!(
            "CREATE TABLE {} ({}){}",
            self.dialect.quote_identifier(&table.name),
            clauses.join(", "),
            self.dialect.create_table_suffix()
        ))
    }

    /// One `ALTER` statement for one entry.
    ///
    /// Returns `Ok(None)` when the entry is well formed but the dialect has
    /// no way to express it (SQLite cannot `MODIFY` a column).
    ///
    /// # Errors
    ///
    /// `InvalidDefinition` when a name or type is invalid, a required part
    /// of the entry is missing, or the action is unknown.
    pub fn build_alter(
        &self,
        table: &str,
        entry: &AlterEntry,
    ) -> std::result::Result<Option<String>, SchemaError> {
        check_table_name(table)?;
        if !is_valid_identifier(&entry.column) {
            return Err(SchemaError::InvalidDefinition(format!(
                "invalid column name '{}'",
                entry.column
            )));
        }

        let sql = match &entry.action {
            AlterAction::Add => Some(self.dialect.add_column_sql(table, &entry.column_def()?)),
            AlterAction::Modify => self.dialect.modify_column_sql(table, &entry.column_def()?),
            AlterAction::DropColumn => Some(self.dialect.drop_column_sql(table, &entry.column)),
            AlterAction::AddUniqueKey => {
                let name = entry.key_name.as_ref().ok_or_else(|| {
                    SchemaError::InvalidDefinition(format!(
                        "unique key on '{}' has no name",
                        entry.column
                    ))
                })?;
                let key = UniqueKey::new(name, entry.columns.clone());
                key.validate()?;
                Some(self.dialect.add_unique_key_sql(table, &key))
            }
            AlterAction::Unsupported(action) => {
                return Err(SchemaError::InvalidDefinition(format!(
                    "unsupported alter action '{action}'"
                )));
            }
        };
        Ok(sql)
    }

    /// One `ALTER` statement for one entry, or `None` when the entry is
    /// malformed or not supported by the dialect. Skipped entries are logged.
    #[must_use]
    pub fn alter_statement(&self, table: &str, entry: &AlterEntry) -> Option<String> {
        match self.build_alter(table, entry) {
            Ok(Some(sql)) => Some(sql),
            Ok(None) => {
                warn!(
                    table = %table,
                    column = %entry.column,
                    dialect = self.dialect.name(),
                    "Column modification not supported, skipping"
                );
                None
            }
            Err(err) => {
                warn!(
                    table = %table,
                    column = %entry.column,
                    action = ?entry.action,
                    error = %err,
                    "Malformed alter entry, skipping"
                );
                None
            }
        }
    }

    /// Statements for every usable entry, in order.
    #[must_use]
    pub fn alter_statements(&self, table: &str, entries: &[AlterEntry]) -> Vec<String> {
        entries
            .iter()
            .filter_map(|entry| self.alter_statement(table, entry))
            .collect()
    }

    /// `DROP TABLE`.
    ///
    /// # Errors
    ///
    /// [`SchemaError::InvalidDefinition`] for an invalid table name.
    pub fn drop_table(&self, table: &str) -> std::result::Result<String, SchemaError> {
        check_table_name(table)?;
        Ok(self.dialect.drop_table_sql(table))
    }

    /// Removes every row (`TRUNCATE TABLE` or the dialect's equivalent).
    ///
    /// # Errors
    ///
    /// [`SchemaError::InvalidDefinition`] for an invalid table name.
    pub fn truncate_table(&self, table: &str) -> std::result::Result<String, SchemaError> {
        check_table_name(table)?;
        Ok(self.dialect.truncate_table_sql(table))
    }
}

fn check_table_name(table: &str) -> std::result::Result<(), SchemaError> {
    if is_valid_identifier(table) {
        Ok(())
    } else {
        Err(SchemaError::InvalidDefinition(format!(
            "invalid table name '{table}'"
        )))
    }
}

impl Database {
    /// Creates a table. See [`DdlPolicy`] for what `Ok(false)` means.
    ///
    /// # Errors
    ///
    /// Under [`DdlPolicy::Strict`], the build or statement error.
    pub async fn create_table(&mut self, table: &TableDef) -> Result<bool> {
        let built = DdlBuilder::new(self.dialect()).create_table(table);
        let result = match built {
            Ok(sql) => self.connection.execute(&sql, &[]).await.map(drop),
            Err(err) => Err(err.into()),
        };
        self.settle("create", &table.name, result)
    }

    /// Applies alter entries one statement at a time. Malformed and
    /// unsupported entries are skipped; the call still succeeds.
    ///
    /// # Errors
    ///
    /// Under [`DdlPolicy::Strict`], `InvalidDefinition` for an invalid table
    /// name and any statement error of an entry that was run.
    pub async fn alter_table(&mut self, table: &str, entries: &[AlterEntry]) -> Result<bool> {
        let result = match check_table_name(table) {
            Ok(()) => {
                let statements = DdlBuilder::new(self.dialect()).alter_statements(table, entries);
                let mut result = Ok(());
                for sql in &statements {
                    if let Err(err) = self.connection.execute(sql, &[]).await {
                        result = Err(err);
                        break;
                    }
                }
                result
            }
            Err(err) => Err(err.into()),
        };
        self.settle("alter", table, result)
    }

    /// Drops a table.
    ///
    /// # Errors
    ///
    /// Under [`DdlPolicy::Strict`], the build or statement error.
    pub async fn drop_table(&mut self, table: &str) -> Result<bool> {
        let built = DdlBuilder::new(self.dialect()).drop_table(table);
        let result = match built {
            Ok(sql) => self.connection.execute(&sql, &[]).await.map(drop),
            Err(err) => Err(err.into()),
        };
        self.settle("drop", table, result)
    }

    /// Removes every row of a table.
    ///
    /// # Errors
    ///
    /// Under [`DdlPolicy::Strict`], the build or statement error.
    pub async fn truncate_table(&mut self, table: &str) -> Result<bool> {
        let built = DdlBuilder::new(self.dialect()).truncate_table(table);
        let result = match built {
            Ok(sql) => self.connection.execute(&sql, &[]).await.map(drop),
            Err(err) => Err(err.into()),
        };
        self.settle("truncate", table, result)
    }

    fn settle(&mut self, operation: &str, table: &str, result: Result<()>) -> Result<bool> {
        let err = match result {
            Ok(()) => return Ok(true),
            Err(err) => err,
        };
        match self.policy {
            DdlPolicy::Strict => Err(err),
            DdlPolicy::Tolerant { max_failures } => {
                self.ddl_failures += 1;
                if self.ddl_failures > max_failures {
                    return Err(err);
                }
                error!(
                    operation = operation,
                    table = %table,
                    failures = self.ddl_failures,
                    error = %err,
                    "DDL operation failed"
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::dialect::{MySqlDialect, SqliteDialect};
    use crate::error::{Error, StatementError};

    fn users_table(id_type: &str) -> TableDef {
        TableDef::new("users")
            .column(ColumnDef::new("id", id_type).extra(&[
                "unsigned",
                "primary   key",
                "auto_increment",
            ]))
            .column(
                ColumnDef::new("username", "VARCHAR(60)")
                    .extra(&["NOT NULL", "CHARACTER SET latin1", "; DROP TABLE users"]),
            )
            .column(ColumnDef::new("email", "VARCHAR(120)").extra(&["DEFAULT ''"]))
            .unique_key(UniqueKey::new("uq_username", vec!["username".into()]))
    }

    async fn create_test_database() -> Database {
        let mut db = Database::new(DatabaseConfig::sqlite(":memory:"));
        db.connect().await.unwrap();
        db
    }

    #[test]
    fn test_modifier_parsing() {
        assert_eq!(Modifier::parse(" not   NULL "), Some(Modifier::NotNull));
        assert_eq!(Modifier::parse("AutoIncrement"), Some(Modifier::AutoIncrement));
        assert_eq!(
            Modifier::parse("default current_timestamp"),
            Some(Modifier::Default("CURRENT_TIMESTAMP".into()))
        );
        assert_eq!(
            Modifier::parse("DEFAULT 'It''s'"),
            Some(Modifier::Default("'It''s'".into()))
        );
        assert_eq!(Modifier::parse("DEFAULT -1.5"), Some(Modifier::Default("-1.5".into())));
        assert_eq!(Modifier::parse("DEFAULT (SELECT 1)"), None);
        assert_eq!(Modifier::parse("ON UPDATE CURRENT_TIMESTAMP"), None);
    }

    #[test]
    fn test_create_table_mysql() {
        let dialect = MySqlDialect::new();
        let sql = DdlBuilder::new(&dialect).create_table(&users_table("BIGINT(10)")).unwrap();

        assert_eq!(
            sql,
            "CREATE TABLE `users` (\
             `id` BIGINT(10) UNSIGNED PRIMARY KEY AUTO_INCREMENT, \
             `username` VARCHAR(60) NOT NULL, \
             `email` VARCHAR(120) DEFAULT '', \
             UNIQUE KEY `uq_username` (`username`)\
             ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
        );
        assert!(!sql.contains("DROP"));
        assert!(!sql.contains("latin1"));
    }

    #[test]
    fn test_create_table_rejects_invalid_definitions() {
        let dialect = SqliteDialect::new();
        let builder = DdlBuilder::new(&dialect);

        let bad_name = TableDef::new("users; --").column(ColumnDef::new("id", "INTEGER"));
        assert!(matches!(
            builder.create_table(&bad_name),
            Err(SchemaError::InvalidDefinition(_))
        ));

        let bad_type = TableDef::new("users").column(ColumnDef::new("id", "INT) ; DROP"));
        assert!(matches!(
            builder.create_table(&bad_type),
            Err(SchemaError::InvalidDefinition(_))
        ));

        let duplicate = TableDef::new("users")
            .column(ColumnDef::new("id", "INTEGER"))
            .column(ColumnDef::new("id", "TEXT"));
        assert!(matches!(
            builder.create_table(&duplicate),
            Err(SchemaError::InvalidDefinition(_))
        ));

        assert!(matches!(
            builder.create_table(&TableDef::new("empty")),
            Err(SchemaError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_sql_type_shapes() {
        for ok in [
            "INTEGER",
            "VARCHAR(60)",
            "decimal(10, 2)",
            "bigint(10) unsigned",
            "ENUM('a','b')",
            "DOUBLE PRECISION",
        ] {
            assert!(is_valid_sql_type(ok), "{ok}");
        }
        for bad in ["", "1INT", "INT;", "VARCHAR(60", "TEXT -- x"] {
            assert!(!is_valid_sql_type(bad), "{bad}");
        }
    }

    #[test]
    fn test_alter_statements_skip_malformed_entries() {
        let dialect = MySqlDialect::new();
        let entries = vec![
            AlterEntry::add("status", "INT(1)").extra(&["NOT NULL", "bogus"]),
            AlterEntry::modify("username", "VARCHAR(80)"),
            AlterEntry::drop_column("legacy"),
            AlterEntry::add_unique_key("email", "uq_email", vec!["email".into()]),
            AlterEntry::with_action("missing_type", AlterAction::Add),
            AlterEntry::add_unique_key("x", "uq_empty", Vec::new()),
            AlterEntry::with_action("x", AlterAction::from("RENAME".to_string())),
        ];

        let statements = DdlBuilder::new(&dialect).alter_statements("users", &entries);
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE `users` ADD COLUMN `status` INT(1) NOT NULL",
                "ALTER TABLE `users` MODIFY `username` VARCHAR(80)",
                "ALTER TABLE `users` DROP COLUMN `legacy`",
                "ALTER TABLE `users` ADD UNIQUE KEY `uq_email` (`email`)",
            ]
        );
    }

    #[test]
    fn test_alter_entries_from_json() {
        let entries: Vec<AlterEntry> = serde_json::from_str(
            r#"[
                {"column": "status", "action": "ADD", "type": "INT(1)", "extra": ["NOT NULL"]},
                {"column": "legacy", "action": "DROP_COLUMN"},
                {"column": "email", "action": "ADD UNIQUE KEY", "keyName": "uq_email", "columns": ["email"]},
                {"column": "x", "action": "CHANGE"}
            ]"#,
        )
        .unwrap();

        assert_eq!(entries[0].action, AlterAction::Add);
        assert_eq!(entries[0].sql_type.as_deref(), Some("INT(1)"));
        assert_eq!(entries[1].action, AlterAction::DropColumn);
        assert_eq!(entries[2].key_name.as_deref(), Some("uq_email"));
        assert_eq!(entries[3].action, AlterAction::Unsupported("CHANGE".into()));
    }

    #[test]
    fn test_modify_skipped_on_sqlite() {
        let dialect = SqliteDialect::new();
        let builder = DdlBuilder::new(&dialect);
        assert!(builder
            .alter_statement("users", &AlterEntry::modify("name", "TEXT"))
            .is_none());
    }

    #[test]
    fn test_build_alter_reports_why_nothing_was_built() {
        let sqlite = SqliteDialect::new();
        let builder = DdlBuilder::new(&sqlite);

        assert!(matches!(
            builder.build_alter("users", &AlterEntry::modify("name", "TEXT")),
            Ok(None)
        ));
        for entry in [
            AlterEntry::add("b", ""),
            AlterEntry::with_action("b", AlterAction::Add),
            AlterEntry::add("bad name", "TEXT"),
            AlterEntry::with_action("b", AlterAction::from("RENAME".to_string())),
        ] {
            assert!(matches!(
                builder.build_alter("users", &entry),
                Err(SchemaError::InvalidDefinition(_))
            ));
        }
        assert!(matches!(
            builder.build_alter("users; --", &AlterEntry::drop_column("b")),
            Err(SchemaError::InvalidDefinition(_))
        ));
    }

    #[tokio::test]
    async fn test_alter_rejects_invalid_table_name() {
        let mut db = create_test_database().await;

        let err = db
            .alter_table("users; DROP TABLE x", &[AlterEntry::add("status", "INTEGER")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::InvalidDefinition(_))
        ));
    }

    #[tokio::test]
    async fn test_create_alter_drop_on_sqlite() {
        let mut db = create_test_database().await;

        assert!(db.create_table(&users_table("INTEGER")).await.unwrap());
        assert!(db.table_exists("users").await.unwrap());

        assert!(db
            .alter_table(
                "users",
                &[
                    AlterEntry::add("status", "INTEGER").extra(&["DEFAULT 0"]),
                    AlterEntry::modify("email", "TEXT"),
                ],
            )
            .await
            .unwrap());
        let columns: Vec<String> = db
            .columns("users")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.field)
            .collect();
        assert_eq!(columns, vec!["id", "username", "email", "status"]);

        db.insert("INSERT INTO users (username) VALUES (?)", &["alice".into()])
            .await
            .unwrap();
        assert!(db.truncate_table("users").await.unwrap());
        assert!(db.select("SELECT * FROM users", &[]).await.unwrap().is_empty());

        assert!(db.drop_table("users").await.unwrap());
        assert!(!db.table_exists("users").await.unwrap());
    }

    #[tokio::test]
    async fn test_strict_policy_raises() {
        let mut db = create_test_database().await;
        let err = db.drop_table("missing").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Statement(StatementError::PrepareFailed { .. } | StatementError::ExecFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_tolerant_policy_counts_failures() {
        let config = DatabaseConfig::sqlite(":memory:")
            .ddl_policy(DdlPolicy::Tolerant { max_failures: 1 });
        let mut db = Database::new(config);
        db.connect().await.unwrap();

        assert!(!db.drop_table("missing").await.unwrap());
        assert!(db.drop_table("missing").await.is_err());
    }
}
