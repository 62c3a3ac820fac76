//! Path classification for incoming filesystem events.
//!
//! Every raw event carries an absolute path; before any rule applies, the
//! path is sorted into one of three buckets: inside the record store,
//! inside the watched tree (and not filtered out), or irrelevant.

use std::path::{Path, PathBuf};

use glob::Pattern;

use super::WatchError;

/// Classification of an absolute event path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathClass {
    /// Under the record-store subtree.
    RecordStore,
    /// A watched file, carrying its path relative to the watched root.
    Watched(PathBuf),
    /// Outside both subtrees, or excluded by the filter.
    Ignored,
}

/// Maps absolute paths to [`PathClass`].
///
/// Pure and immutable after construction; safe to share across tasks.
#[derive(Debug)]
pub struct PathClassifier {
    root: PathBuf,
    storage_root: PathBuf,
    ignore_patterns: Vec<Pattern>,
}

impl PathClassifier {
    /// Create a classifier for `root` with its record store at
    /// `storage_root` (must be `root` itself or nested under it, keeping
    /// the two subtrees disjoint by construction).
    pub fn new(
        root: PathBuf,
        storage_root: PathBuf,
        ignore_patterns: &[String],
    ) -> Result<Self, WatchError> {
        let ignore_patterns = ignore_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| WatchError::ConfigError {
                    reason: format!("invalid ignore pattern '{p}': {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root,
            storage_root,
            ignore_patterns,
        })
    }

    /// Classify an absolute path.
    pub fn classify(&self, path: &Path) -> PathClass {
        if path == self.storage_root || path.starts_with(&self.storage_root) {
            return PathClass::RecordStore;
        }

        let Ok(rel) = path.strip_prefix(&self.root) else {
            return PathClass::Ignored;
        };
        if rel.as_os_str().is_empty() {
            // The root directory itself is not a watched file.
            return PathClass::Ignored;
        }

        if self.is_ignored(rel) {
            return PathClass::Ignored;
        }

        PathClass::Watched(rel.to_path_buf())
    }

    /// Check a root-relative path against the ignore patterns.
    ///
    /// Patterns match the relative path as a whole and each file name
    /// component, so `*.tmp` excludes temp files anywhere in the tree.
    pub fn is_ignored(&self, rel: &Path) -> bool {
        self.ignore_patterns.iter().any(|pattern| {
            pattern.matches_path(rel)
                || rel
                    .file_name()
                    .map(|name| pattern.matches_path(Path::new(name)))
                    .unwrap_or(false)
        })
    }
}
