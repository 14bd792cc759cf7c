//! List snapshot persistence
//!
//! Reads and writes the complete item collection as a single JSON blob.
//! Nothing here knows about list semantics; it only serializes and parses.
//!
//! Storage location: `~/.local/share/shoplist/` (configurable via `Config`)
//!
//! Files:
//! - `shopping-list-data.json` - pretty-printed array of items
//! - `shopping-list-data.json.corrupt.backup` - copy of an unreadable snapshot

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::error::{StorageError, StorageResult};
use crate::config::Config;
use crate::models::Item;

/// A persistent home for the list snapshot
///
/// `load` returns an empty list when nothing has been saved yet and
/// `StorageError::CorruptStore` when a snapshot exists but cannot be parsed.
pub trait DurableStore: Send {
    /// Read the last saved snapshot
    fn load(&self) -> StorageResult<Vec<Item>>;

    /// Overwrite the saved snapshot with `items`
    fn save(&self, items: &[Item]) -> StorageResult<()>;

    /// Human-readable description of where the snapshot lives
    fn location(&self) -> String;
}

/// Snapshot stored as a JSON file on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store the snapshot at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the snapshot in the configured data directory
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.data_file_path())
    }

    /// Path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a snapshot exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Where a corrupt snapshot gets copied before it is overwritten
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt.backup");
        PathBuf::from(name)
    }

    fn back_up_corrupt(&self) -> Option<PathBuf> {
        let backup = self.backup_path();
        match fs::copy(&self.path, &backup) {
            Ok(_) => Some(backup),
            Err(e) => {
                warn!("Could not back up corrupt list to {:?}: {}", backup, e);
                None
            }
        }
    }
}

impl DurableStore for JsonFileStore {
    fn load(&self) -> StorageResult<Vec<Item>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No list snapshot at {:?}", self.path);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(StorageError::ReadError {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| StorageError::CorruptStore {
            path: self.path.clone(),
            backup_path: self.back_up_corrupt(),
            details: e.to_string(),
        })
    }

    fn save(&self, items: &[Item]) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(items)?;
        atomic_write(&self.path, &json)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Snapshot held in memory, for ephemeral servers and tests
///
/// Clones share the same blob, so a test can keep one handle and pass
/// another to the store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    blob: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with raw blob content
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Arc::new(Mutex::new(Some(blob.into()))),
        }
    }

    /// Raw content of the last save, if any
    pub fn blob(&self) -> Option<String> {
        self.blob.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("has_blob", &self.blob().is_some())
            .finish()
    }
}

impl DurableStore for MemoryStore {
    fn load(&self) -> StorageResult<Vec<Item>> {
        let Some(blob) = self.blob() else {
            return Ok(Vec::new());
        };

        serde_json::from_str(&blob).map_err(|e| StorageError::CorruptStore {
            path: PathBuf::from(self.location()),
            backup_path: None,
            details: e.to_string(),
        })
    }

    fn save(&self, items: &[Item]) -> StorageResult<()> {
        let json = serde_json::to_string(items)?;
        *self.blob.lock().unwrap_or_else(|e| e.into_inner()) = Some(json);
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|e| StorageError::from_io(e, path.to_path_buf()))?;

    Ok(())
}
