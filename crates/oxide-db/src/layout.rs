//! On-disk layout of schema snapshots and backups.
//!
//! ```text
//! <root>/schema/<version>.snapshot
//! <root>/backup/<unix-seconds>.sql
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::IoError;
use crate::snapshot::SnapshotStore;

/// Directory of schema snapshots under the root.
pub const SCHEMA_DIR: &str = "schema";
/// Directory of backups under the root.
pub const BACKUP_DIR: &str = "backup";
/// Backup file extension.
pub const BACKUP_EXTENSION: &str = "sql";

/// Paths derived from the configured root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Creates a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/schema`
    #[must_use]
    pub fn schema_dir(&self) -> PathBuf {
        self.root.join(SCHEMA_DIR)
    }

    /// `<root>/backup`
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    /// Snapshot store over the schema directory.
    #[must_use]
    pub fn snapshots(&self) -> SnapshotStore {
        SnapshotStore::new(self.schema_dir())
    }

    /// Backup files, most recent first.
    ///
    /// # Errors
    ///
    /// [`IoError::ReadFailed`] when the directory cannot be listed.
    pub fn backups(&self) -> Result<Vec<PathBuf>, IoError> {
        let mut files = files_with_extension(&self.backup_dir(), BACKUP_EXTENSION)?;
        files.sort_by(|a, b| b.cmp(a));
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Most recently created backup.
    ///
    /// # Errors
    ///
    /// [`IoError::NotFound`] when there is no backup.
    pub fn latest_backup(&self) -> Result<PathBuf, IoError> {
        latest_file(&self.backup_dir(), BACKUP_EXTENSION)
    }
}

/// Most recently created file with the given extension in `dir`.
///
/// Creation time is used where the filesystem records it, modification
/// time otherwise. Ties go to the greater file name.
///
/// # Errors
///
/// [`IoError::NotFound`] when no file matches, [`IoError::ReadFailed`]
/// when the directory cannot be listed.
pub fn latest_file(dir: &Path, extension: &str) -> Result<PathBuf, IoError> {
    files_with_extension(dir, extension)?
        .into_iter()
        .max()
        .map(|(_, path)| path)
        .ok_or_else(|| IoError::NotFound(dir.to_path_buf()))
}

fn files_with_extension(
    dir: &Path,
    extension: &str,
) -> Result<Vec<(SystemTime, PathBuf)>, IoError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(IoError::ReadFailed {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| IoError::ReadFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let metadata = entry.metadata().map_err(|source| IoError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        if !metadata.is_file() {
            continue;
        }
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((created, path));
    }
    Ok(files)
}
