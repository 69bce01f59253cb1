//! On-disk storage: workspace backups and document files

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::Catalog;
use crate::error::StorageError;
use crate::json;
use crate::model::Side;
use crate::serialization::Document;

/// Default storage directory, relative to the project root.
pub const STORAGE_DIR: &str = ".blockdiff";

/// A saved copy of one side's document, kept in the mergeable format so
/// stacks of any length can be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub saved_at: DateTime<Utc>,
    pub document: Value,
}

/// Backups and share files under one directory.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    /// Storage under `root/dir`.
    pub fn new(root: &Path, dir: impl AsRef<Path>) -> Self {
        Storage {
            dir: root.join(dir),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shares_dir(&self) -> PathBuf {
        self.dir.join("shares")
    }

    pub fn backup_path(&self, side: Side) -> PathBuf {
        self.dir.join(format!("backup-{}.json", side))
    }

    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn save_backup(&self, side: Side, document: &Document) -> Result<Backup, StorageError> {
        self.ensure_dir()?;
        let backup = Backup {
            saved_at: Utc::now(),
            document: document.to_mergeable_json(),
        };
        let path = self.backup_path(side);
        write_json(&path, &serde_json::to_value(&backup)?)?;
        debug!("Backed up {} workspace to {}", side, path.display());
        Ok(backup)
    }

    pub fn load_backup(&self, side: Side) -> Result<Option<Backup>, StorageError> {
        let path = self.backup_path(side);
        if !path.exists() {
            return Ok(None);
        }
        let source = read_string(&path)?;
        Ok(Some(json::from_str(&source)?))
    }

    /// Remove the storage directory and everything in it.
    pub fn clear(&self) -> Result<bool, StorageError> {
        if !self.dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;
        Ok(true)
    }
}

/// Read a native or mergeable document from disk.
pub fn read_document(path: &Path, catalog: &Catalog) -> Result<Document, StorageError> {
    let source = read_string(path)?;
    Ok(Document::parse(&source, catalog)?)
}

/// Write a document, flattened if `mergeable` is set.
pub fn write_document(path: &Path, document: &Document, mergeable: bool) -> Result<(), StorageError> {
    let value = if mergeable {
        document.to_mergeable_json()
    } else {
        document.to_json()?
    };
    write_json(path, &value)
}

pub fn write_json(path: &Path, value: &Value) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_string(path: &Path) -> Result<String, StorageError> {
    std::fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}
