//! Per-key debounced action scheduling.
//!
//! Each key holds at most one pending action; scheduling again before the
//! delay elapses cancels the previous one (cancel-and-reschedule). Actions
//! fire on spawned tasks so a slow action never stalls event intake.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::task::TaskTracker;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Delayed one-shot actions keyed by path, with last-write-wins
/// supersession.
///
/// A task deregisters itself (under the table lock) after its delay and
/// before running its action, so aborts from a newer `schedule` can only
/// land on tasks that are still sleeping; an action that has started is
/// never cancelled mid-flight.
pub struct DebounceTable {
    pending: Mutex<HashMap<PathBuf, Pending>>,
    delay: Duration,
    next_generation: AtomicU64,
    tracker: TaskTracker,
}

impl DebounceTable {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
            delay,
            next_generation: AtomicU64::new(0),
            tracker: TaskTracker::new(),
        })
    }

    /// Schedule `action` to run after the table's delay, cancelling any
    /// pending action for the same key.
    pub fn schedule<F, Fut>(self: &Arc<Self>, key: PathBuf, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let table = Arc::clone(self);
        let task_key = key.clone();

        let handle = self.tracker.spawn(async move {
            sleep(table.delay).await;
            {
                // Deregister before running. A concurrent schedule for
                // this key that wins the lock first replaces the entry
                // and aborts us here; if we win, the action runs to
                // completion regardless of later schedules.
                let mut pending = table.pending.lock();
                match pending.get(&task_key) {
                    Some(entry) if entry.generation == generation => {
                        pending.remove(&task_key);
                    }
                    _ => return, // superseded
                }
            }
            action().await;
        });

        let mut pending = self.pending.lock();
        if let Some(old) = pending.insert(key, Pending { generation, handle }) {
            old.handle.abort();
        }
    }

    /// Cancel the pending action for `key`, if any.
    pub fn cancel(&self, key: &Path) {
        if let Some(old) = self.pending.lock().remove(key) {
            old.handle.abort();
        }
    }

    /// Cancel every pending action.
    pub fn cancel_all(&self) {
        for (_, old) in self.pending.lock().drain() {
            old.handle.abort();
        }
    }

    /// Cancel pending actions and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.cancel_all();
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_action_fires_after_delay() {
        let table = DebounceTable::new(Duration::from_millis(30));
        let fired = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&fired);
        table.schedule(PathBuf::from("doc.txt"), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reschedule_supersedes() {
        let table = DebounceTable::new(Duration::from_millis(50));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let f = Arc::clone(&fired);
            table.schedule(PathBuf::from("doc.txt"), move || async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
            sleep(Duration::from_millis(10)).await;
        }

        sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let table = DebounceTable::new(Duration::from_millis(30));
        let fired = Arc::new(AtomicUsize::new(0));

        for name in ["a.txt", "b.txt", "c.txt"] {
            let f = Arc::clone(&fired);
            table.schedule(PathBuf::from(name), move || async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }

        sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let table = DebounceTable::new(Duration::from_millis(30));
        let fired = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&fired);
        table.schedule(PathBuf::from("doc.txt"), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        table.cancel(Path::new("doc.txt"));

        sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_on_shutdown() {
        let table = DebounceTable::new(Duration::from_millis(30));
        let fired = Arc::new(AtomicUsize::new(0));

        for name in ["a.txt", "b.txt"] {
            let f = Arc::clone(&fired);
            table.schedule(PathBuf::from(name), move || async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }
        table.shutdown().await;

        sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_action() {
        let table = DebounceTable::new(Duration::from_millis(10));
        let fired = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&fired);
        table.schedule(PathBuf::from("slow.txt"), move || async move {
            sleep(Duration::from_millis(50)).await;
            f.fetch_add(1, Ordering::SeqCst);
        });

        // Let the action start, then shut down; the started action must
        // complete before shutdown returns.
        sleep(Duration::from_millis(25)).await;
        table.shutdown().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
