//! The event reconciliation engine.
//!
//! Consumes classified raw events and decides, per watched path, the one
//! correct store action: capture current attributes, restore them from
//! the record, or retire the record. The ingestion path never blocks; it
//! only classifies, consults the self-write guard, and schedules or
//! cancels debounce entries. All store work runs on spawned tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::task::TaskTracker;

use crate::storage::AttributeStore;

use super::classifier::{PathClass, PathClassifier};
use super::debounce::DebounceTable;
use super::events::RawEvent;
use super::guard::SelfWriteGuard;
use super::rename::match_publish_rename;

/// Delays the engine runs on.
#[derive(Debug, Clone, Copy)]
pub struct EngineTimings {
    /// Quiet period before a burst of modifications commits to one capture.
    pub debounce: Duration,
    /// Wait before a deletion is believed; must exceed the notify
    /// backend's coalescing window so delete-then-recreate saves do not
    /// retire a live file's record.
    pub delete_confirm: Duration,
    /// Pause before the single retry of a publish-triggered restore.
    pub retry_delay: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            delete_confirm: Duration::from_millis(2000),
            retry_delay: Duration::from_millis(750),
        }
    }
}

/// Store calls that get exactly one retry on a transient failure.
///
/// Publish renames race with the sync client's own lock on the file it
/// just moved into place, so the first attempt is allowed to fail once.
enum RetryableOp {
    Restore(PathBuf),
    RecordPublished(PathBuf),
}

impl RetryableOp {
    fn describe(&self) -> (&'static str, &Path) {
        match self {
            RetryableOp::Restore(rel) => ("restore", rel),
            RetryableOp::RecordPublished(path) => ("record-published", path),
        }
    }

    async fn run(&self, store: &dyn AttributeStore) -> Result<(), crate::storage::StoreError> {
        match self {
            RetryableOp::Restore(rel) => store.restore(rel).await,
            RetryableOp::RecordPublished(path) => store.record_published(path).await,
        }
    }
}

/// The reconciliation engine.
///
/// One instance per watched root; owns its timer tables and task tracker
/// rather than leaning on process-wide state.
pub struct Reconciler {
    classifier: Arc<PathClassifier>,
    guard: Arc<SelfWriteGuard>,
    store: Arc<dyn AttributeStore>,
    modify_timers: Arc<DebounceTable>,
    delete_timers: Arc<DebounceTable>,
    retry_delay: Duration,
    tracker: TaskTracker,
}

impl Reconciler {
    pub fn new(
        classifier: Arc<PathClassifier>,
        store: Arc<dyn AttributeStore>,
        guard: Arc<SelfWriteGuard>,
        timings: EngineTimings,
    ) -> Self {
        Self {
            classifier,
            guard,
            store,
            modify_timers: DebounceTable::new(timings.debounce),
            delete_timers: DebounceTable::new(timings.delete_confirm),
            retry_delay: timings.retry_delay,
            tracker: TaskTracker::new(),
        }
    }

    /// Single ingestion entry point.
    ///
    /// Never blocks and never panics outward; a bad event is logged and
    /// the next one is processed normally.
    pub fn handle_event(&self, event: RawEvent) {
        match event {
            RawEvent::Modified(path) => self.on_modified(path),
            RawEvent::Moved { from, to } => self.on_moved(from, to),
            RawEvent::Deleted(path) => self.on_deleted(&path),
        }
    }

    /// Cancel pending timers and drain in-flight store actions.
    pub async fn shutdown(&self) {
        self.modify_timers.shutdown().await;
        self.delete_timers.shutdown().await;
        self.tracker.close();
        self.tracker.wait().await;
        crate::log_event!("engine", "drained");
    }

    fn on_modified(&self, path: PathBuf) {
        // Our own writes echo back as modifications; drop each exactly
        // once. Checked before classification because the engine writes
        // both watched files (restore) and record files (capture).
        if self.guard.consume(&path) {
            crate::debug_event!("engine", "self-write suppressed", "{}", path.display());
            return;
        }

        match self.classifier.classify(&path) {
            PathClass::RecordStore => {
                let store = Arc::clone(&self.store);
                self.tracker.spawn(async move {
                    if let Err(e) = store.record_updated_externally(&path).await {
                        tracing::warn!(
                            "[engine] external record update ignored for {}: {e}",
                            path.display()
                        );
                    }
                });
            }
            PathClass::Watched(rel) => self.schedule_capture(rel),
            PathClass::Ignored => {}
        }
    }

    fn on_moved(&self, from: PathBuf, to: PathBuf) {
        // The store writes records as temp-then-rename, and that rename
        // echoes back here with the marker sitting on the destination.
        if self.guard.consume(&to) {
            self.guard.consume(&from);
            crate::debug_event!("engine", "self-write suppressed", "{}", to.display());
            return;
        }

        crate::debug_event!("engine", "moved", "{} -> {}", from.display(), to.display());

        let published = match (file_name(&from), file_name(&to)) {
            (Some(old_name), Some(new_name)) => {
                match_publish_rename(old_name, new_name).is_some()
            }
            _ => false,
        };

        if published {
            // The sync client just finished a download. The move itself
            // raises no modify event, so act now rather than debounce.
            match self.classifier.classify(&to) {
                PathClass::RecordStore => {
                    self.spawn_with_retry(RetryableOp::RecordPublished(to));
                }
                PathClass::Watched(rel) => {
                    self.spawn_with_retry(RetryableOp::Restore(rel));
                }
                PathClass::Ignored => {}
            }
            return;
        }

        // Generic rename: the old identity is observationally a deletion
        // (confirmed before the record is retired), the new one a fresh
        // modification.
        if let PathClass::Watched(old_rel) = self.classifier.classify(&from) {
            // Same as a deletion: a capture pending for the old identity
            // has nothing left to read.
            self.modify_timers.cancel(&old_rel);
            self.schedule_delete_confirm(old_rel);
        }
        if let PathClass::Watched(new_rel) = self.classifier.classify(&to) {
            self.schedule_capture(new_rel);
        }
    }

    fn on_deleted(&self, path: &Path) {
        if let PathClass::Watched(rel) = self.classifier.classify(path) {
            // A capture pending for a gone file has nothing to read.
            self.modify_timers.cancel(&rel);
            self.schedule_delete_confirm(rel);
        }
    }

    fn schedule_capture(&self, rel: PathBuf) {
        let store = Arc::clone(&self.store);
        self.modify_timers.schedule(rel.clone(), move || async move {
            if let Err(e) = store.capture(&rel).await {
                tracing::error!("[engine] capture failed for {}: {e}", rel.display());
            }
        });
    }

    fn schedule_delete_confirm(&self, rel: PathBuf) {
        let store = Arc::clone(&self.store);
        self.delete_timers.schedule(rel.clone(), move || async move {
            // Editors delete-then-recreate as part of an atomic save;
            // only a path still absent at fire time loses its record.
            if store.exists(&rel) {
                crate::debug_event!("engine", "reappeared, kept record", "{}", rel.display());
                return;
            }
            if let Err(e) = store.retire_record(&rel).await {
                tracing::error!("[engine] retire failed for {}: {e}", rel.display());
            }
        });
    }

    fn spawn_with_retry(&self, op: RetryableOp) {
        let store = Arc::clone(&self.store);
        let retry_delay = self.retry_delay;
        self.tracker.spawn(async move {
            run_with_retry(store.as_ref(), op, retry_delay).await;
        });
    }
}

/// Bounded retry: one attempt, one retry on a transient failure, then
/// log and drop. Never loops.
async fn run_with_retry(store: &dyn AttributeStore, op: RetryableOp, retry_delay: Duration) {
    let (name, path) = {
        let (name, path) = op.describe();
        (name, path.to_path_buf())
    };

    match op.run(store).await {
        Ok(()) => return,
        Err(e) if e.is_transient() => {
            crate::log_event!("engine", "retrying", "{name} {}: {e}", path.display());
        }
        Err(e) => {
            tracing::error!("[engine] {name} dropped for {}: {e}", path.display());
            return;
        }
    }

    sleep(retry_delay).await;
    if let Err(e) = op.run(store).await {
        tracing::error!(
            "[engine] {name} dropped for {} after retry: {e}",
            path.display()
        );
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}
