//! The watch service: notify subscription plus the ingestion loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::engine::Reconciler;
use super::error::WatchError;
use super::events::RawEvent;
use super::guard::SelfWriteGuard;

/// Interval for dropping expired self-write markers.
const GUARD_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Owns the recursive filesystem subscription and feeds the engine.
///
/// The loop only flattens notify events and hands them to
/// [`Reconciler::handle_event`]; everything slow happens on the engine's
/// worker tasks.
pub struct WatchService {
    root: PathBuf,
    engine: Arc<Reconciler>,
    guard: Arc<SelfWriteGuard>,
    event_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    _watcher: notify::RecommendedWatcher,
}

impl WatchService {
    pub fn new(
        root: PathBuf,
        engine: Arc<Reconciler>,
        guard: Arc<SelfWriteGuard>,
    ) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel(1024);
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.blocking_send(res);
        })?;

        Ok(Self {
            root,
            engine,
            guard,
            event_rx: rx,
            _watcher: watcher,
        })
    }

    /// Watch the root until Ctrl-C, then drain the engine.
    pub async fn run(mut self) -> Result<(), WatchError> {
        self._watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;

        crate::log_event!("watcher", "started", "{}", self.root.display());

        let mut sweep = tokio::time::interval(GUARD_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                received = self.event_rx.recv() => {
                    match received {
                        Some(Ok(event)) => {
                            for raw in RawEvent::from_notify(event) {
                                self.engine.handle_event(raw);
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!("[watcher] file watch error: {e}");
                        }
                        None => return Err(WatchError::ChannelClosed),
                    }
                }

                _ = sweep.tick() => {
                    self.guard.sweep_expired();
                }

                _ = tokio::signal::ctrl_c() => {
                    break;
                }
            }
        }

        crate::log_event!("watcher", "stopping");
        self.engine.shutdown().await;
        Ok(())
    }
}
