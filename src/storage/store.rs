//! Filesystem-backed attribute record store.
//!
//! Records mirror the watched tree under `<storage_dir>/records`, one
//! JSON file per watched file. The store performs every actual xattr
//! syscall and every record read/write; the reconciliation engine only
//! decides when to call it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::watcher::{PathClass, PathClassifier, SelfWriteGuard};

use super::record::{AttributeRecord, RECORD_SUFFIX};
use super::StoreError;

/// The engine's view of the record store.
///
/// Implementations must be idempotent: capturing an unchanged file twice
/// yields an equivalent record, restoring twice is harmless.
#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// Snapshot the file's current attributes into its record.
    async fn capture(&self, rel: &Path) -> Result<(), StoreError>;

    /// Apply the stored record's attributes onto the file.
    async fn restore(&self, rel: &Path) -> Result<(), StoreError>;

    /// Remove the record for a file that no longer exists.
    async fn retire_record(&self, rel: &Path) -> Result<(), StoreError>;

    /// A record file was just published by the sync client; re-apply it.
    async fn record_published(&self, record_path: &Path) -> Result<(), StoreError>;

    /// A record file was modified outside the engine. The store owns the
    /// freshness comparison and decides whether anything happens.
    async fn record_updated_externally(&self, record_path: &Path) -> Result<(), StoreError>;

    /// Whether the watched file currently exists.
    fn exists(&self, rel: &Path) -> bool;
}

/// Record store writing JSON records and real extended attributes.
pub struct FilesystemAttributeStore {
    root: PathBuf,
    records_root: PathBuf,
    classifier: Arc<PathClassifier>,
    guard: Arc<SelfWriteGuard>,
}

impl FilesystemAttributeStore {
    /// Create a store rooted at `records_root`, creating the directory if
    /// needed. `guard` is shared with the engine so the store can flag
    /// its own writes before performing them.
    pub fn new(
        root: PathBuf,
        records_root: PathBuf,
        classifier: Arc<PathClassifier>,
        guard: Arc<SelfWriteGuard>,
    ) -> Result<Self, StoreError> {
        fs::create_dir_all(&records_root).map_err(|e| StoreError::io(&records_root, e))?;
        Ok(Self {
            root,
            records_root,
            classifier,
            guard,
        })
    }

    /// Record file path for a watched relative path.
    pub fn record_path_for(&self, rel: &Path) -> PathBuf {
        let mut path = self.records_root.join(rel);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(RECORD_SUFFIX);
        path.set_file_name(name);
        path
    }

    /// Inverse of [`record_path_for`](Self::record_path_for).
    fn rel_for_record(&self, record_path: &Path) -> Result<PathBuf, StoreError> {
        let invalid = || StoreError::InvalidRecordPath {
            path: record_path.to_path_buf(),
        };
        let rel = record_path
            .strip_prefix(&self.records_root)
            .map_err(|_| invalid())?;
        let name = rel.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
        let stem = name.strip_suffix(RECORD_SUFFIX).ok_or_else(invalid)?;
        if stem.is_empty() {
            return Err(invalid());
        }
        Ok(rel.with_file_name(stem))
    }

    /// Read all extended attributes of a file.
    fn read_attrs(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
        let mut attrs = BTreeMap::new();
        let names = xattr::list(path).map_err(|e| StoreError::io(path, e))?;
        for name in names {
            let Some(name) = name.to_str().map(str::to_owned) else {
                tracing::debug!("[store] skipping non-utf8 xattr name on {}", path.display());
                continue;
            };
            if let Some(value) =
                xattr::get(path, &name).map_err(|e| StoreError::io(path, e))?
            {
                attrs.insert(name, value);
            }
        }
        Ok(attrs)
    }

    /// Write a record's attributes onto its file, flagging the write so
    /// the resulting notification is suppressed exactly once.
    fn apply_record(&self, record: &AttributeRecord) -> Result<(), StoreError> {
        let target = self.root.join(&record.path);
        let current = Self::read_attrs(&target)?;

        let to_set: Vec<_> = record
            .attrs
            .iter()
            .filter(|(name, value)| current.get(*name) != Some(*value))
            .collect();
        // Attributes the record does not know about were not on the file
        // when it was captured; drop them so restore is a full snapshot.
        let to_remove: Vec<_> = current
            .keys()
            .filter(|name| !record.attrs.contains_key(*name))
            .collect();

        if to_set.is_empty() && to_remove.is_empty() {
            crate::debug_event!("store", "already current", "{}", record.path.display());
            return Ok(());
        }

        // A marker without a write behind it would swallow the next
        // genuine event; flag the file only now that a write follows.
        self.guard.mark(&target);

        for (name, value) in to_set {
            xattr::set(&target, name, value).map_err(|e| StoreError::io(&target, e))?;
        }
        for name in to_remove {
            xattr::remove(&target, name).map_err(|e| StoreError::io(&target, e))?;
        }

        crate::debug_event!("store", "restored", "{}", record.path.display());
        Ok(())
    }

    fn capture_sync(&self, rel: &Path) -> Result<(), StoreError> {
        let target = self.root.join(rel);
        if !target.exists() {
            // Vanished between the event and the debounce firing; the
            // deletion path will retire the record.
            crate::debug_event!("store", "capture skipped, gone", "{}", rel.display());
            return Ok(());
        }

        let attrs = Self::read_attrs(&target)?;
        let record = AttributeRecord::new(rel.to_path_buf(), attrs);
        let record_path = self.record_path_for(rel);

        // Both the temp file and the final record raise notifications.
        self.guard.mark(record_path.with_extension("json.tmp"));
        self.guard.mark(&record_path);
        record.write_to(&record_path)?;

        crate::debug_event!("store", "captured", "{}", rel.display());
        Ok(())
    }

    fn restore_sync(&self, rel: &Path) -> Result<(), StoreError> {
        let record_path = self.record_path_for(rel);
        let record = match AttributeRecord::read_from(&record_path) {
            Ok(record) => record,
            Err(StoreError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                // Nothing captured for this file yet.
                crate::debug_event!("store", "no record", "{}", rel.display());
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.apply_record(&record)
    }

    fn retire_sync(&self, rel: &Path) -> Result<(), StoreError> {
        let record_path = self.record_path_for(rel);
        match fs::remove_file(&record_path) {
            Ok(()) => {
                crate::log_event!("store", "retired", "{}", rel.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&record_path, e)),
        }
    }

    fn record_published_sync(&self, record_path: &Path) -> Result<(), StoreError> {
        // Validates the path shape even though only the parsed record is
        // used, so stray files in the store are reported early.
        self.rel_for_record(record_path)?;
        let record = AttributeRecord::read_from(record_path)?;
        if !self.root.join(&record.path).exists() {
            crate::debug_event!(
                "store",
                "published record has no file yet",
                "{}",
                record.path.display()
            );
            return Ok(());
        }
        self.apply_record(&record)
    }

    fn record_updated_sync(&self, record_path: &Path) -> Result<(), StoreError> {
        if self.rel_for_record(record_path).is_err() {
            // Temp files and other non-record noise inside the store dir.
            crate::debug_event!("store", "ignoring non-record", "{}", record_path.display());
            return Ok(());
        }
        let record = AttributeRecord::read_from(record_path)?;
        let target = self.root.join(&record.path);
        let metadata = match fs::metadata(&target) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::io(&target, e)),
        };

        // Only apply a record that is newer than the file's last write;
        // otherwise the file is the fresher side and the next capture
        // will overwrite the record instead.
        let modified = metadata.modified().map_err(|e| StoreError::io(&target, e))?;
        if record.captured_at > DateTime::<Utc>::from(modified) {
            self.apply_record(&record)?;
        }
        Ok(())
    }

    /// Capture every watched file under the root. Returns how many
    /// records were written; individual failures are logged and skipped.
    pub fn rebuild_from_tree(&self) -> Result<usize, StoreError> {
        let mut captured = 0;
        for entry in WalkDir::new(&self.root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let PathClass::Watched(rel) = self.classifier.classify(entry.path()) else {
                continue;
            };
            match self.capture_sync(&rel) {
                Ok(()) => captured += 1,
                Err(e) => tracing::warn!("[store] rebuild skipped {}: {e}", rel.display()),
            }
        }
        crate::log_event!("store", "rebuilt", "{captured} records");
        Ok(captured)
    }

    /// Apply every stored record back onto its file. Returns how many
    /// files were refreshed; corrupt records and missing files are
    /// logged and skipped.
    pub fn refresh_watched_files(&self) -> Result<usize, StoreError> {
        let mut refreshed = 0;
        for entry in WalkDir::new(&self.records_root)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if self.rel_for_record(entry.path()).is_err() {
                continue;
            }
            let record = match AttributeRecord::read_from(entry.path()) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("[store] refresh skipped {}: {e}", entry.path().display());
                    continue;
                }
            };
            if !self.root.join(&record.path).exists() {
                continue;
            }
            match self.apply_record(&record) {
                Ok(()) => refreshed += 1,
                Err(e) => {
                    tracing::warn!("[store] refresh failed {}: {e}", record.path.display());
                }
            }
        }
        crate::log_event!("store", "refreshed", "{refreshed} files");
        Ok(refreshed)
    }

    /// Find records whose watched path matches a glob pattern.
    pub fn records_matching(&self, pattern: &str) -> Result<Vec<AttributeRecord>, StoreError> {
        let pattern = glob::Pattern::new(pattern).map_err(|e| StoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let mut records = Vec::new();
        for entry in WalkDir::new(&self.records_root)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = self.rel_for_record(entry.path()) else {
                continue;
            };
            if !pattern.matches_path(&rel) {
                continue;
            }
            match AttributeRecord::read_from(entry.path()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("[store] lookup skipped {}: {e}", entry.path().display());
                }
            }
        }
        Ok(records)
    }

    /// Drop every stored record.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.records_root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&self.records_root, e)),
        }
        fs::create_dir_all(&self.records_root).map_err(|e| StoreError::io(&self.records_root, e))?;
        crate::log_event!("store", "cleared");
        Ok(())
    }
}

#[async_trait]
impl AttributeStore for FilesystemAttributeStore {
    async fn capture(&self, rel: &Path) -> Result<(), StoreError> {
        self.capture_sync(rel)
    }

    async fn restore(&self, rel: &Path) -> Result<(), StoreError> {
        self.restore_sync(rel)
    }

    async fn retire_record(&self, rel: &Path) -> Result<(), StoreError> {
        self.retire_sync(rel)
    }

    async fn record_published(&self, record_path: &Path) -> Result<(), StoreError> {
        self.record_published_sync(record_path)
    }

    async fn record_updated_externally(&self, record_path: &Path) -> Result<(), StoreError> {
        self.record_updated_sync(record_path)
    }

    fn exists(&self, rel: &Path) -> bool {
        self.root.join(rel).exists()
    }
}
