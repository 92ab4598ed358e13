//! Bounded key-value partitions backing the cache.
//!
//! A partition behaves like browser local storage: string keys, opaque byte
//! values, and a byte quota that rejects writes with `StorageQuotaExceeded`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CatalogError, Result};

/// A key-value store with an optional byte quota.
pub trait StoragePartition: Send + Sync {
    /// Name used in logs and quota errors.
    fn name(&self) -> &str;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    /// Removes `key`; removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

pub type SharedPartition = Arc<dyn StoragePartition>;

fn quota_error(partition: &str, key: &str, size: usize) -> CatalogError {
    CatalogError::StorageQuotaExceeded {
        partition: partition.to_string(),
        key: key.to_string(),
        size,
    }
}

// --- Memory Implementation ---

/// In-memory partition. Usage counts key and value bytes.
#[derive(Debug)]
pub struct MemoryPartition {
    name: String,
    quota: Option<usize>,
    data: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryPartition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quota: None,
            data: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_quota(name: impl Into<String>, quota_bytes: usize) -> Self {
        Self {
            quota: Some(quota_bytes),
            ..Self::new(name)
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.lock().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.data
            .lock()
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }
}

impl StoragePartition for MemoryPartition {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut data = self.data.lock();
        if let Some(quota) = self.quota {
            let used: usize = data
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, bytes)| existing.len() + bytes.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(quota_error(&self.name, key, value.len()));
            }
        }
        data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.data.lock().remove(key);
        Ok(())
    }
}

// --- File Implementation ---

const PARTITION_FILE_EXTENSION: &str = "bin";

/// Partition storing one file per key under a directory.
///
/// Writes go to a temp file that is renamed into place, so a reader never
/// observes a half-written value.
#[derive(Debug, Clone)]
pub struct FilePartition {
    name: String,
    root: PathBuf,
    quota: Option<usize>,
}

impl FilePartition {
    pub fn new(name: impl Into<String>, root: PathBuf) -> Self {
        Self {
            name: name.into(),
            root,
            quota: None,
        }
    }

    pub fn with_quota(name: impl Into<String>, root: PathBuf, quota_bytes: usize) -> Self {
        Self {
            quota: Some(quota_bytes),
            ..Self::new(name, root)
        }
    }

    fn build_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let filename = format!("{}.{PARTITION_FILE_EXTENSION}", escape_key(key));
        Ok(self.root.join(filename))
    }

    /// Bytes used by every stored value except `exclude`.
    fn used_bytes_excluding(&self, exclude: &Path) -> Result<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error.into()),
        };
        let mut used = 0usize;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path == exclude
                || path.extension().and_then(|ext| ext.to_str()) != Some(PARTITION_FILE_EXTENSION)
            {
                continue;
            }
            used += entry.metadata()?.len() as usize;
        }
        Ok(used)
    }
}

impl StoragePartition for FilePartition {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.build_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(CatalogError::Internal(format!(
                "failed to read partition file {}: {error}",
                path.display()
            ))),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.build_path(key)?;
        if let Some(quota) = self.quota {
            if self.used_bytes_excluding(&path)? + value.len() > quota {
                return Err(quota_error(&self.name, key, value.len()));
            }
        }

        fs::create_dir_all(&self.root).map_err(|error| {
            CatalogError::Internal(format!(
                "failed to create partition directory {}: {error}",
                self.root.display()
            ))
        })?;

        let tmp_path = path.with_extension("tmp");
        {
            let mut output = File::create(&tmp_path).map_err(|error| {
                CatalogError::Internal(format!(
                    "failed to create partition file {}: {error}",
                    tmp_path.display()
                ))
            })?;
            output.write_all(value)?;
            output.sync_all()?;
        }

        fs::rename(&tmp_path, &path).map_err(|error| {
            CatalogError::Internal(format!(
                "failed to finalize partition file {}: {error}",
                path.display()
            ))
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.build_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// Maps a key to a file stem, one-to-one. `%` and `:` are percent-encoded.
fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key == "." || key == ".." {
        return Err(CatalogError::InvalidInput(format!(
            "invalid storage key {key:?}"
        )));
    }
    if key.contains('/') || key.contains('\\') {
        return Err(CatalogError::InvalidInput(format!(
            "invalid storage key {key:?}"
        )));
    }
    Ok(())
}
