//! End-to-end schema lifecycle against in-memory SQLite databases sharing
//! one snapshot/backup root.

use std::path::Path;

use oxide_db::prelude::*;
use oxide_db::SchemaError;

async fn open(root: &Path) -> Database {
    let mut db = Database::new(DatabaseConfig::sqlite(":memory:").root(root));
    db.connect().await.unwrap();
    db.install_version_table(1).await.unwrap();
    db
}

fn users() -> TableDef {
    TableDef::new("users")
        .column(ColumnDef::new("id", "INTEGER").extra(&["PRIMARY KEY", "AUTO_INCREMENT"]))
        .column(ColumnDef::new("username", "VARCHAR(60)").extra(&["NOT NULL"]))
        .unique_key(UniqueKey::new("uq_username", vec!["username".into()]))
}

#[tokio::test]
async fn test_snapshot_upgrade_backup_restore() {
    let root = tempfile::tempdir().unwrap();

    // Version 1: users
    let mut primary = open(root.path()).await;
    assert!(primary.create_table(&users()).await.unwrap());
    let v1 = primary.capture().await.unwrap();
    assert_eq!(v1.version, 1);
    assert!(v1.tables.contains_key("users"));

    // Version 2: users.email and a posts table
    assert!(primary
        .alter_table("users", &[AlterEntry::add("email", "VARCHAR(120)")])
        .await
        .unwrap());
    assert!(primary
        .create_table(
            &TableDef::new("posts")
                .column(ColumnDef::new("id", "INTEGER").primary_key())
                .column(ColumnDef::new("title", "TEXT").not_null()),
        )
        .await
        .unwrap());
    primary.set_version(2).await.unwrap();
    let v2 = primary.capture().await.unwrap();

    let diff = plan(&v1, &v2);
    let kinds: Vec<MigrationKind> = diff.steps.iter().map(MigrationStep::kind).collect();
    assert_eq!(kinds, vec![MigrationKind::CreateTable, MigrationKind::AddColumn]);

    // A second database built from version 1 catches up
    let mut replica = open(root.path()).await;
    replica
        .execute_script(&format!("{};", v1.tables["users"].create_statement))
        .await
        .unwrap();
    let applied = replica.upgrade(None).await.unwrap();
    assert_eq!((applied.from, applied.to), (1, 2));
    assert_eq!(replica.current_version().await.unwrap(), 2);
    assert_eq!(replica.tables().await.unwrap(), primary.tables().await.unwrap());
    assert_eq!(
        replica.columns("users").await.unwrap(),
        primary.columns("users").await.unwrap()
    );

    // Upgrading again changes nothing
    let again = replica.upgrade(Some(2)).await.unwrap_err();
    assert!(again.is_no_op());
    assert!(matches!(
        replica.upgrade(Some(1)).await,
        Err(Error::Schema(SchemaError::VersionRegression { current: 2, target: 1 }))
    ));

    // Backup, lose a table, restore
    replica
        .insert("INSERT INTO users (username) VALUES (?)", &["alice".into()])
        .await
        .unwrap();
    replica
        .insert(
            "INSERT INTO posts (id, title) VALUES (?, ?)",
            &[7.into(), "It's here".into()],
        )
        .await
        .unwrap();
    let backup = replica.backup().await.unwrap();

    assert!(replica.drop_table("posts").await.unwrap());
    assert!(!replica.table_exists("posts").await.unwrap());

    assert_eq!(replica.restore(Some(backup.as_path())).await.unwrap(), backup);
    let rows = replica.select("SELECT id, title FROM posts", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Int(7)));
    assert_eq!(rows[0].text("title").as_deref(), Some("It's here"));
    assert_eq!(replica.current_version().await.unwrap(), 2);
}

#[tokio::test]
async fn test_backup_restore_round_trip() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path()).await;
    db.execute_script(
        "CREATE TABLE T (id INTEGER PRIMARY KEY, name VARCHAR(10));\n\
         INSERT INTO T (id, name) VALUES (1, 'x');\n\
         INSERT INTO T (id, name) VALUES (2, 'y');",
    )
    .await
    .unwrap();

    db.backup().await.unwrap();
    db.drop_table("T").await.unwrap();
    db.restore(None).await.unwrap();

    let mut rows: Vec<(i64, String)> = db
        .select("SELECT id, name FROM T", &[])
        .await
        .unwrap()
        .iter()
        .map(|row| {
            (
                row.get("id").and_then(Value::as_i64).unwrap(),
                row.text("name").unwrap(),
            )
        })
        .collect();
    rows.sort();
    assert_eq!(rows, vec![(1, "x".to_string()), (2, "y".to_string())]);
}

#[tokio::test]
async fn test_snapshot_diffed_against_itself_is_empty() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path()).await;
    db.create_table(&users()).await.unwrap();

    let live = db.inspect().await.unwrap();
    let stored = db.capture().await.unwrap();
    assert_eq!(live, stored);
    assert!(plan(&stored, &stored).is_empty());
    assert!(db.upgrade(None).await.unwrap_err().is_no_op());
}
