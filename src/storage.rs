//! Key-value persistence for small string blobs (snapshots, tokens).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
  #[error("invalid storage key '{0}'")]
  InvalidKey(String),
  #[error("storage I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// A string-valued persistent map.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
  fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
  fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store. Contents vanish with the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    Ok(self.entries.lock().get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self
      .entries
      .lock()
      .insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    self.entries.lock().remove(key);
    Ok(())
  }
}

/// One file per key inside a directory.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a reader sees either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileStore {
  dir: PathBuf,
}

impl FileStore {
  /// Open (and create if needed) a store rooted at `dir`.
  pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
    let dir = dir.into();
    fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
      path: dir.clone(),
      source,
    })?;
    Ok(Self { dir })
  }

  /// `<data_dir>/pdcs/storage`
  pub fn default_dir() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|p| p.join("pdcs").join("storage"))
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
    let valid = !key.is_empty()
      && key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
      && !key.starts_with('.');
    if !valid {
      return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(self.dir.join(key))
  }
}

impl KeyValueStore for FileStore {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let path = self.path_for(key)?;
    match fs::read_to_string(&path) {
      Ok(contents) => Ok(Some(contents)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(source) => Err(StorageError::Io { path, source }),
    }
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    let path = self.path_for(key)?;
    let io_err = |source| StorageError::Io {
      path: path.clone(),
      source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
    tmp.write_all(value.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(&path).map_err(|e| io_err(e.error))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    let path = self.path_for(key)?;
    match fs::remove_file(&path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(StorageError::Io { path, source }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_memory_store_roundtrip() {
    let store = MemoryStore::new();
    assert_eq!(store.get("a").unwrap(), None);
    store.set("a", "1").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
    store.remove("a").unwrap();
    assert_eq!(store.get("a").unwrap(), None);
  }

  #[test]
  fn test_file_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("kv")).unwrap();
    store.set("sqlite-db", "AAEC").unwrap();
    store.set("sqlite-db", "AAED").unwrap();

    let reopened = FileStore::open(dir.path().join("kv")).unwrap();
    assert_eq!(reopened.get("sqlite-db").unwrap().as_deref(), Some("AAED"));

    reopened.remove("sqlite-db").unwrap();
    reopened.remove("sqlite-db").unwrap();
    assert_eq!(store.get("sqlite-db").unwrap(), None);
  }

  #[test]
  fn test_file_store_rejects_path_like_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    assert!(matches!(
      store.set("../escape", "x"),
      Err(StorageError::InvalidKey(_))
    ));
    assert!(matches!(store.get(""), Err(StorageError::InvalidKey(_))));
  }
}
