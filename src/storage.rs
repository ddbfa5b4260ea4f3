//! Shared persistence plumbing for the durable collections.
//!
//! Both collections (ledger, review schedule) are whole-file JSON lists.
//! Reads degrade to an empty collection on corruption; writes go through a
//! temp-file-then-rename swap so a crash cannot leave a half-written file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Data directory not found")]
    DataDirNotFound,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Get the default data directory
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|p| p.join("dojo"))
        .ok_or(StorageError::DataDirNotFound)
}

/// Load a JSON collection, treating a missing or unreadable file as empty.
///
/// Corruption is logged and swallowed; the caller always gets a usable list.
pub fn load_collection<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    if !path.exists() {
        return Vec::new();
    }

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Failed to read {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_str(&content) {
        Ok(items) => items,
        Err(e) => {
            log::warn!(
                "Corrupt collection at {} ({}); treating as empty",
                path.display(),
                e
            );
            Vec::new()
        }
    }
}

/// Save a JSON collection using atomic write (write to .tmp then rename)
pub fn save_collection<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(items)?;
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let items: Vec<u32> = load_collection(&temp.path().join("nope.json"));
        assert!(items.is_empty());
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let items: Vec<u32> = load_collection(&path);
        assert!(items.is_empty());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nums.json");
        save_collection(&path, &[1u32, 2, 3]).unwrap();
        let items: Vec<u32> = load_collection(&path);
        assert_eq!(items, vec![1, 2, 3]);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
