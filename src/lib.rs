pub mod config;
pub mod logging;
pub mod storage;
pub mod watcher;

pub use config::Settings;
pub use storage::{AttributeRecord, AttributeStore, FilesystemAttributeStore, StoreError};
pub use watcher::{
    EngineTimings, PathClass, PathClassifier, RawEvent, Reconciler, SelfWriteGuard, WatchError,
    WatchService,
};
