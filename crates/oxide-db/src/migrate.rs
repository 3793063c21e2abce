//! Snapshot-driven schema migration.
//!
//! [`plan`] compares two snapshots and lists the DDL steps that turn the
//! first schema into the second. [`Database::upgrade`] resolves the
//! snapshots for the live version and the target, applies the steps as they
//! come, and finally records the target version.
//!
//! Steps are applied one at a time without a surrounding transaction. A
//! failure stops the upgrade where it is and the version is left unchanged.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ddl::{AlterEntry, DdlBuilder};
use crate::error::{Error, IoError, Result, SchemaError};
use crate::snapshot::Snapshot;
use crate::Database;

/// Kind of a migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationKind {
    /// A table missing from the current schema.
    CreateTable,
    /// A column missing from the current table.
    AddColumn,
    /// A column whose type, nullability or default changed.
    ModifyColumn,
    /// A column absent from the target table.
    DropColumn,
}

/// One DDL step of a migration plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationStep {
    /// Create a table from the target's stored statement.
    CreateTable {
        /// Table name.
        table: String,
        /// `CREATE TABLE` text taken verbatim from the target snapshot.
        create_statement: String,
        /// Index statements stored next to it, run after the table exists.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        indexes: Vec<String>,
    },
    /// Add a column with the target's type.
    AddColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Target type.
        sql_type: String,
    },
    /// Reissue a column with the target's type.
    ///
    /// Only the type is carried over. A change limited to nullability or
    /// default triggers the step but is not itself applied.
    ModifyColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Target type.
        sql_type: String,
    },
    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
}

impl MigrationStep {
    /// Kind of this step.
    #[must_use]
    pub fn kind(&self) -> MigrationKind {
        match self {
            Self::CreateTable { .. } => MigrationKind::CreateTable,
            Self::AddColumn { .. } => MigrationKind::AddColumn,
            Self::ModifyColumn { .. } => MigrationKind::ModifyColumn,
            Self::DropColumn { .. } => MigrationKind::DropColumn,
        }
    }

    /// Table this step applies to.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. }
            | Self::AddColumn { table, .. }
            | Self::ModifyColumn { table, .. }
            | Self::DropColumn { table, .. } => table,
        }
    }

    fn alter_entry(&self) -> Option<AlterEntry> {
        match self {
            Self::CreateTable { .. } => None,
            Self::AddColumn {
                column, sql_type, ..
            } => Some(AlterEntry::add(column, sql_type)),
            Self::ModifyColumn {
                column, sql_type, ..
            } => Some(AlterEntry::modify(column, sql_type)),
            Self::DropColumn { column, .. } => Some(AlterEntry::drop_column(column)),
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table, .. } => write!(f, "CREATE_TABLE {table}"),
            Self::AddColumn {
                table,
                column,
                sql_type,
            } => write!(f, "ADD_COLUMN {table}.{column} {sql_type}"),
            Self::ModifyColumn {
                table,
                column,
                sql_type,
            } => write!(f, "MODIFY_COLUMN {table}.{column} {sql_type}"),
            Self::DropColumn { table, column } => write!(f, "DROP_COLUMN {table}.{column}"),
        }
    }
}

/// Ordered steps between two schema versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    /// Version migrated from.
    pub from: i64,
    /// Version migrated to.
    pub to: i64,
    /// Steps in application order.
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Returns true when the schemas already match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Computes the steps that turn `current` into `target`.
///
/// Tables are visited in name order. Within a table, target columns come
/// first in catalog order (adds and modifies), followed by the columns only
/// the current table has, in its catalog order (drops). Tables that exist
/// only in `current` are left alone.
#[must_use]
pub fn plan(current: &Snapshot, target: &Snapshot) -> MigrationPlan {
    let mut steps = Vec::new();

    for (name, wanted) in &target.tables {
        let Some(existing) = current.tables.get(name) else {
            steps.push(MigrationStep::CreateTable {
                table: name.clone(),
                create_statement: wanted.create_statement.clone(),
                indexes: wanted.indexes.clone(),
            });
            continue;
        };

        for column in &wanted.columns {
            match existing.column(&column.field) {
                None => steps.push(MigrationStep::AddColumn {
                    table: name.clone(),
                    column: column.field.clone(),
                    sql_type: column.column_type.clone(),
                }),
                Some(old) if old.differs_from(column) => {
                    steps.push(MigrationStep::ModifyColumn {
                        table: name.clone(),
                        column: column.field.clone(),
                        sql_type: column.column_type.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        for column in &existing.columns {
            if wanted.column(&column.field).is_none() {
                steps.push(MigrationStep::DropColumn {
                    table: name.clone(),
                    column: column.field.clone(),
                });
            }
        }
    }

    MigrationPlan {
        from: current.version,
        to: target.version,
        steps,
    }
}

/// Maps a missing snapshot file onto the schema error naming it.
fn missing_as(err: Error, schema_error: SchemaError) -> Error {
    match err {
        Error::Io(IoError::NotFound(_)) => schema_error.into(),
        other => other,
    }
}

impl Database {
    /// Migrates the live schema to the snapshot of `target`, or to the most
    /// recently stored snapshot when `target` is `None`.
    ///
    /// Returns the applied plan. An upgrade to the current version fails
    /// with [`SchemaError::NoOp`] and changes nothing.
    ///
    /// # Errors
    ///
    /// [`SchemaError::TargetNotFound`] or [`SchemaError::CurrentNotFound`]
    /// for a missing snapshot, [`SchemaError::NoOp`] and
    /// [`SchemaError::VersionRegression`] for a target at or below the live
    /// version, and the first failing step's error.
    pub async fn upgrade(&mut self, target: Option<i64>) -> Result<MigrationPlan> {
        let store = self.layout.snapshots();
        let target_snapshot = match target {
            Some(version) => store.load(version),
            None => store.latest(),
        }
        .map_err(|err| missing_as(err, SchemaError::TargetNotFound { version: target }))?;

        let current = self.current_version().await?;
        let current_snapshot = store
            .load(current)
            .map_err(|err| missing_as(err, SchemaError::CurrentNotFound(current)))?;

        let target_version = target_snapshot.version;
        if current > target_version {
            return Err(SchemaError::VersionRegression {
                current,
                target: target_version,
            }
            .into());
        }
        if current == target_version {
            return Err(SchemaError::NoOp(current).into());
        }

        let plan = plan(&current_snapshot, &target_snapshot);
        info!(
            from = plan.from,
            to = plan.to,
            steps = plan.steps.len(),
            "Upgrading schema"
        );

        for step in &plan.steps {
            self.apply_step(step).await?;
        }

        self.set_version(target_version).await?;
        info!(version = target_version, "Schema upgraded");
        Ok(plan)
    }

    async fn apply_step(&mut self, step: &MigrationStep) -> Result<()> {
        debug!(step = %step, "Applying migration step");
        let table = step.table();
        let exists = self.connection.table_exists(table).await?;

        if let MigrationStep::CreateTable {
            create_statement,
            indexes,
            ..
        } = step
        {
            if exists {
                return Err(SchemaError::TableExists(table.to_string()).into());
            }
            self.connection.execute(create_statement, &[]).await?;
            for sql in indexes {
                self.connection.execute(sql, &[]).await?;
            }
            return Ok(());
        }

        if !exists {
            return Err(SchemaError::TableNotFound(table.to_string()).into());
        }
        let built = match step.alter_entry() {
            Some(entry) => DdlBuilder::new(self.dialect()).build_alter(table, &entry),
            None => Ok(None),
        };
        match built? {
            Some(sql) => {
                self.connection.execute(&sql, &[]).await?;
            }
            None => warn!(
                step = %step,
                dialect = self.dialect().name(),
                "Column modification not supported, step skipped"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::DatabaseConfig;
    use crate::snapshot::{ColumnMeta, SnapshotStore, TableSnapshot};
    use crate::value::Value;

    fn column(field: &str, column_type: &str) -> ColumnMeta {
        ColumnMeta {
            field: field.to_string(),
            column_type: column_type.to_string(),
            null: "YES".to_string(),
            default: None,
            key: String::new(),
            extra: String::new(),
        }
    }

    fn table(create_statement: &str, columns: Vec<ColumnMeta>) -> TableSnapshot {
        TableSnapshot {
            create_statement: create_statement.to_string(),
            columns,
            indexes: Vec::new(),
        }
    }

    fn snapshot(version: i64, tables: Vec<(&str, TableSnapshot)>) -> Snapshot {
        Snapshot {
            version,
            tables: tables
                .into_iter()
                .map(|(name, t)| (name.to_string(), t))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_plan_against_itself_is_empty() {
        let s = snapshot(
            1,
            vec![("t", table("CREATE TABLE t (a INT)", vec![column("a", "INT")]))],
        );
        assert!(plan(&s, &s).is_empty());
    }

    #[test]
    fn test_plan_adds_and_drops_columns() {
        let current = snapshot(
            1,
            vec![(
                "t",
                table("", vec![column("a", "INT"), column("b", "VARCHAR(10)")]),
            )],
        );
        let target = snapshot(
            2,
            vec![(
                "t",
                table("", vec![column("a", "INT"), column("c", "VARCHAR(10)")]),
            )],
        );

        let plan = plan(&current, &target);
        assert_eq!((plan.from, plan.to), (1, 2));
        assert_eq!(
            plan.steps,
            vec![
                MigrationStep::AddColumn {
                    table: "t".into(),
                    column: "c".into(),
                    sql_type: "VARCHAR(10)".into(),
                },
                MigrationStep::DropColumn {
                    table: "t".into(),
                    column: "b".into(),
                },
            ]
        );
    }

    #[test]
    fn test_plan_creates_tables_verbatim_and_modifies_columns() {
        let mut nullable = column("name", "TEXT");
        nullable.null = "NO".to_string();

        let current = snapshot(
            3,
            vec![
                ("users", table("", vec![column("name", "TEXT")])),
                ("legacy", table("", vec![column("x", "INT")])),
            ],
        );
        let target = snapshot(
            4,
            vec![
                ("users", table("", vec![nullable])),
                ("posts", table("CREATE TABLE posts (id INT) -- as stored", vec![])),
            ],
        );

        let plan = plan(&current, &target);
        let kinds: Vec<_> = plan.steps.iter().map(MigrationStep::kind).collect();
        assert_eq!(
            kinds,
            vec![MigrationKind::CreateTable, MigrationKind::ModifyColumn]
        );
        assert_eq!(
            plan.steps[0],
            MigrationStep::CreateTable {
                table: "posts".into(),
                create_statement: "CREATE TABLE posts (id INT) -- as stored".into(),
                indexes: Vec::new(),
            }
        );
        assert_eq!(plan.steps[1].to_string(), "MODIFY_COLUMN users.name TEXT");
        // tables only in the current schema are not dropped
        assert!(plan.steps.iter().all(|s| s.table() != "legacy"));
    }

    #[test]
    fn test_plan_serializes_with_kind_tag() {
        let step = MigrationStep::DropColumn {
            table: "t".into(),
            column: "b".into(),
        };
        assert_eq!(
            serde_json::to_value(&step).unwrap(),
            serde_json::json!({"kind": "DROP_COLUMN", "table": "t", "column": "b"})
        );
    }

    async fn create_test_database(root: &std::path::Path) -> Database {
        let mut db = Database::new(DatabaseConfig::sqlite(":memory:").root(root));
        db.connect().await.unwrap();
        db.install_version_table(1).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_upgrade_resolution_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = create_test_database(dir.path()).await;

        assert!(matches!(
            db.upgrade(Some(2)).await,
            Err(Error::Schema(SchemaError::TargetNotFound { version: Some(2) }))
        ));
        assert!(matches!(
            db.upgrade(None).await,
            Err(Error::Schema(SchemaError::TargetNotFound { version: None }))
        ));

        let store = SnapshotStore::new(dir.path().join("schema"));
        store.write(&snapshot(2, vec![])).unwrap();
        assert!(matches!(
            db.upgrade(Some(2)).await,
            Err(Error::Schema(SchemaError::CurrentNotFound(1)))
        ));

        store.write(&snapshot(1, vec![])).unwrap();
        store.write(&snapshot(0, vec![])).unwrap();
        assert!(matches!(
            db.upgrade(Some(0)).await,
            Err(Error::Schema(SchemaError::VersionRegression { current: 1, target: 0 }))
        ));
        let err = db.upgrade(Some(1)).await.unwrap_err();
        assert!(err.is_no_op());
    }

    #[tokio::test]
    async fn test_upgrade_applies_steps_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = create_test_database(dir.path()).await;
        db.execute("CREATE TABLE t (a INTEGER, b TEXT)", &[])
            .await
            .unwrap();

        let store = SnapshotStore::new(dir.path().join("schema"));
        store
            .write(&snapshot(
                1,
                vec![("t", table("", vec![column("a", "INTEGER"), column("b", "TEXT")]))],
            ))
            .unwrap();
        store
            .write(&snapshot(
                2,
                vec![
                    (
                        "t",
                        table("", vec![column("a", "INTEGER"), column("c", "TEXT")]),
                    ),
                    (
                        "u",
                        table("CREATE TABLE u (id INTEGER PRIMARY KEY)", vec![]),
                    ),
                ],
            ))
            .unwrap();

        let applied = db.upgrade(Some(2)).await.unwrap();
        assert_eq!(applied.steps.len(), 3);
        assert_eq!(db.current_version().await.unwrap(), 2);
        assert!(db.table_exists("u").await.unwrap());
        let columns: Vec<String> = db
            .columns("t")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.field)
            .collect();
        assert_eq!(columns, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_failed_step_keeps_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = create_test_database(dir.path()).await;

        let store = SnapshotStore::new(dir.path().join("schema"));
        store.write(&snapshot(1, vec![])).unwrap();
        store
            .write(&snapshot(
                2,
                vec![("t", table("CREATE TABLE t (oops", vec![]))],
            ))
            .unwrap();

        assert!(matches!(
            db.upgrade(Some(2)).await,
            Err(Error::Statement(_))
        ));
        assert_eq!(db.current_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unbuildable_step_keeps_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = create_test_database(dir.path()).await;
        db.execute("CREATE TABLE t (a INTEGER)", &[]).await.unwrap();

        // SQLite reports an empty type for an untyped column
        let store = SnapshotStore::new(dir.path().join("schema"));
        store
            .write(&snapshot(1, vec![("t", table("", vec![column("a", "INTEGER")]))]))
            .unwrap();
        store
            .write(&snapshot(
                2,
                vec![("t", table("", vec![column("a", "INTEGER"), column("b", "")]))],
            ))
            .unwrap();

        assert!(matches!(
            db.upgrade(Some(2)).await,
            Err(Error::Schema(SchemaError::InvalidDefinition(_)))
        ));
        assert_eq!(db.current_version().await.unwrap(), 1);
        let columns: Vec<String> = db
            .columns("t")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.field)
            .collect();
        assert_eq!(columns, vec!["a"]);
    }

    #[tokio::test]
    async fn test_sqlite_modify_is_skipped_and_version_advances() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = create_test_database(dir.path()).await;
        db.execute("CREATE TABLE t (a INTEGER)", &[]).await.unwrap();

        let store = SnapshotStore::new(dir.path().join("schema"));
        store
            .write(&snapshot(1, vec![("t", table("", vec![column("a", "INTEGER")]))]))
            .unwrap();
        store
            .write(&snapshot(2, vec![("t", table("", vec![column("a", "TEXT")]))]))
            .unwrap();

        let applied = db.upgrade(Some(2)).await.unwrap();
        assert_eq!(applied.steps[0].kind(), MigrationKind::ModifyColumn);
        assert_eq!(db.current_version().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_created_table_gets_its_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = create_test_database(dir.path()).await;

        let mut t = table("CREATE TABLE t (a INTEGER)", vec![column("a", "INTEGER")]);
        t.indexes = vec!["CREATE UNIQUE INDEX uq_a ON t (a)".to_string()];
        let store = SnapshotStore::new(dir.path().join("schema"));
        store.write(&snapshot(1, vec![])).unwrap();
        store.write(&snapshot(2, vec![("t", t)])).unwrap();

        db.upgrade(Some(2)).await.unwrap();
        db.insert("INSERT INTO t (a) VALUES (?)", &[Value::Int(1)])
            .await
            .unwrap();
        assert!(db
            .insert("INSERT INTO t (a) VALUES (?)", &[Value::Int(1)])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_existing_table_blocks_create() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = create_test_database(dir.path()).await;
        db.execute("CREATE TABLE t (a INTEGER)", &[]).await.unwrap();

        let store = SnapshotStore::new(dir.path().join("schema"));
        store.write(&snapshot(1, vec![])).unwrap();
        store
            .write(&snapshot(2, vec![("t", table("CREATE TABLE t (a INTEGER)", vec![]))]))
            .unwrap();

        assert!(matches!(
            db.upgrade(Some(2)).await,
            Err(Error::Schema(SchemaError::TableExists(name))) if name == "t"
        ));
    }
}
