//! Suppression of the engine's own filesystem writes.
//!
//! Restoring attributes onto a file (or rewriting a record) raises a
//! modify notification just like an external edit would. The guard lets
//! the write path flag a path right before touching it, and the ingestion
//! path consume that flag exactly once when the echo arrives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Consume-once markers for paths the engine is about to write.
///
/// Markers expire after a TTL so a coalesced-away echo cannot suppress a
/// genuine external modification forever.
#[derive(Debug)]
pub struct SelfWriteGuard {
    markers: Mutex<HashMap<PathBuf, Instant>>,
    ttl: Duration,
}

impl SelfWriteGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            markers: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Flag `path` as about to be written by us.
    ///
    /// Call immediately before the filesystem write that will raise the
    /// notification; a repeated mark refreshes the expiry.
    pub fn mark(&self, path: impl Into<PathBuf>) {
        self.markers.lock().insert(path.into(), Instant::now());
    }

    /// Consume the marker for `path` if one is live.
    ///
    /// Returns true (and removes the marker) when the event should be
    /// suppressed; an expired marker is dropped and reported as false.
    pub fn consume(&self, path: &Path) -> bool {
        let mut markers = self.markers.lock();
        match markers.remove(path) {
            Some(marked_at) if marked_at.elapsed() <= self.ttl => true,
            _ => false,
        }
    }

    /// Drop markers whose echo never arrived.
    pub fn sweep_expired(&self) {
        let ttl = self.ttl;
        self.markers
            .lock()
            .retain(|_, marked_at| marked_at.elapsed() <= ttl);
    }

    /// Number of live markers (expired ones included until swept).
    pub fn marker_count(&self) -> usize {
        self.markers.lock().len()
    }
}
