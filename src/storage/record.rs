//! Persisted attribute records.
//!
//! One record per watched file, stored as JSON next to nothing else the
//! sync client cares about. Records are plain data; all decisions about
//! when to write or apply them live in the store and the engine.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;

/// Suffix appended to a watched file's relative path to form its record
/// file name.
pub const RECORD_SUFFIX: &str = ".attrs.json";

/// Snapshot of one file's extended attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    /// Path of the watched file, relative to the watched root.
    pub path: PathBuf,
    /// Captured attribute names and raw values.
    pub attrs: BTreeMap<String, Vec<u8>>,
    /// When this snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

impl AttributeRecord {
    pub fn new(path: PathBuf, attrs: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            path,
            attrs,
            captured_at: Utc::now(),
        }
    }

    /// Read a record from disk.
    ///
    /// An unparseable file is reported as `CorruptRecord`; callers treat
    /// that as "record absent" rather than failing the operation.
    pub fn read_from(path: &Path) -> Result<Self, StoreError> {
        let data = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        serde_json::from_slice(&data).map_err(|e| StoreError::CorruptRecord {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write the record atomically (temp file then rename), so a record
    /// is never observed half-written.
    pub fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| StoreError::CorruptRecord {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> AttributeRecord {
        let mut attrs = BTreeMap::new();
        attrs.insert("user.tags".to_string(), b"red,urgent".to_vec());
        attrs.insert("user.rating".to_string(), vec![0x05]);
        AttributeRecord::new(PathBuf::from("docs/report.txt"), attrs)
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let record_path = dir.path().join("report.txt.attrs.json");

        let record = sample();
        record.write_to(&record_path).unwrap();

        let loaded = AttributeRecord::read_from(&record_path).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_corrupt_record_reported() {
        let dir = TempDir::new().unwrap();
        let record_path = dir.path().join("broken.attrs.json");
        std::fs::write(&record_path, b"{ not json").unwrap();

        let err = AttributeRecord::read_from(&record_path).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_missing_record_is_transient_io() {
        let dir = TempDir::new().unwrap();
        let err = AttributeRecord::read_from(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let record_path = dir.path().join("a/b/c.attrs.json");
        sample().write_to(&record_path).unwrap();
        assert!(record_path.exists());
    }
}
