//! Schema snapshots.
//!
//! A [`Snapshot`] records, for one schema version, every table's
//! `CREATE TABLE` text and column metadata. Snapshots are stored as JSON,
//! one file per version (`<version>.snapshot`), and are never rewritten
//! once stored.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{IoError, Result};
use crate::layout::latest_file;
use crate::Database;

/// Snapshot file extension.
pub const SNAPSHOT_EXTENSION: &str = "snapshot";

/// One column as the catalog describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnMeta {
    /// Column name.
    pub field: String,
    /// Column type as reported, e.g. `varchar(60)`.
    #[serde(rename = "Type")]
    pub column_type: String,
    /// `YES` or `NO`.
    pub null: String,
    /// Default value, `None` when the column has none.
    pub default: Option<String>,
    /// Key membership (`PRI`, `UNI`, `MUL` or empty).
    #[serde(default)]
    pub key: String,
    /// Extra attributes such as `auto_increment`.
    #[serde(default)]
    pub extra: String,
}

impl ColumnMeta {
    /// True when type, nullability or default differ.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        self.column_type != other.column_type
            || self.null != other.null
            || self.default != other.default
    }
}

/// One table in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    /// `CREATE TABLE` text as reported by the backend.
    pub create_statement: String,
    /// Columns in catalog order.
    pub columns: Vec<ColumnMeta>,
    /// Index statements kept outside the `CREATE TABLE` text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<String>,
}

impl TableSnapshot {
    /// Looks a column up by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.field == name)
    }
}

/// The schema at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version.
    pub version: i64,
    /// Tables by name.
    pub tables: BTreeMap<String, TableSnapshot>,
}

/// Snapshot files in one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Creates a store over `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding a given version.
    #[must_use]
    pub fn path_for(&self, version: i64) -> PathBuf {
        self.dir.join(format!("{version}.{SNAPSHOT_EXTENSION}"))
    }

    /// Stores a snapshot. Fails if one already exists for that version.
    ///
    /// # Errors
    ///
    /// [`IoError::WriteFailed`], including when the version is already stored.
    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        let path = self.path_for(snapshot.version);
        let write_failed = |source: std::io::Error| IoError::WriteFailed {
            path: path.clone(),
            source,
        };

        let text = serde_json::to_string_pretty(snapshot).map_err(|source| IoError::Malformed {
            path: path.clone(),
            source,
        })?;
        fs::create_dir_all(&self.dir).map_err(write_failed)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(write_failed)?;
        file.write_all(text.as_bytes()).map_err(write_failed)?;
        file.sync_all().map_err(write_failed)?;

        Ok(path)
    }

    /// Loads the snapshot of one version.
    ///
    /// # Errors
    ///
    /// See [`SnapshotStore::load_path`].
    pub fn load(&self, version: i64) -> Result<Snapshot> {
        Self::load_path(&self.path_for(version))
    }

    /// Loads a snapshot file.
    ///
    /// # Errors
    ///
    /// [`IoError::NotFound`], [`IoError::ReadFailed`] or [`IoError::Malformed`].
    pub fn load_path(path: &Path) -> Result<Snapshot> {
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                IoError::NotFound(path.to_path_buf())
            } else {
                IoError::ReadFailed {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let snapshot = serde_json::from_str(&text).map_err(|source| IoError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(snapshot)
    }

    /// Loads the most recently created snapshot file.
    ///
    /// # Errors
    ///
    /// [`IoError::NotFound`] when nothing is stored, or a load error.
    pub fn latest(&self) -> Result<Snapshot> {
        let path = latest_file(&self.dir, SNAPSHOT_EXTENSION)?;
        Self::load_path(&path)
    }

    /// Stored versions, ascending. Files whose name is not a number are
    /// ignored.
    ///
    /// # Errors
    ///
    /// [`IoError::ReadFailed`] when the directory cannot be listed.
    pub fn versions(&self) -> Result<Vec<i64>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(IoError::ReadFailed {
                    path: self.dir.clone(),
                    source,
                }
                .into())
            }
        };

        let mut versions: Vec<i64> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(SNAPSHOT_EXTENSION))
            .filter_map(|path| path.file_stem()?.to_str()?.parse().ok())
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }
}

impl Database {
    /// Reads the live schema without storing it.
    ///
    /// # Errors
    ///
    /// Any catalog or version-table error.
    pub async fn inspect(&mut self) -> Result<Snapshot> {
        let version = self.current_version().await?;
        let mut tables = BTreeMap::new();
        for table in self.connection.tables().await? {
            let create_statement = self.connection.create_statement(&table).await?;
            let columns = self.connection.columns(&table).await?;
            let indexes = self.connection.index_statements(&table).await?;
            tables.insert(
                table,
                TableSnapshot {
                    create_statement,
                    columns,
                    indexes,
                },
            );
        }
        Ok(Snapshot { version, tables })
    }

    /// Reads the live schema and stores it under its version.
    ///
    /// # Errors
    ///
    /// An inspection error, or [`IoError::WriteFailed`] when the version is
    /// already stored.
    pub async fn capture(&mut self) -> Result<Snapshot> {
        let snapshot = self.inspect().await?;
        let path = self.layout.snapshots().write(&snapshot)?;
        info!(
            version = snapshot.version,
            tables = snapshot.tables.len(),
            path = %path.display(),
            "Schema snapshot written"
        );
        Ok(snapshot)
    }

    /// The most recently stored snapshot.
    ///
    /// # Errors
    ///
    /// See [`SnapshotStore::latest`].
    pub fn latest_snapshot(&self) -> Result<Snapshot> {
        self.layout.snapshots().latest()
    }
}
