//! Event reconciliation for the attribute side-store.
//!
//! A single recursive watch feeds the reconciliation engine, which
//! decides per path whether to capture, restore, or retire a record.
//!
//! # Architecture
//!
//! ```text
//! notify subscription
//!       |
//!  WatchService (flatten to RawEvent)
//!       |
//!  Reconciler
//!    - PathClassifier (record store / watched / ignored)
//!    - SelfWriteGuard (suppress our own echoes)
//!    - match_publish_rename (sync-client temp-file renames)
//!    - DebounceTable x2 (modify-commit, delete-confirm)
//!       |
//!  AttributeStore (capture / restore / retire)
//! ```

mod classifier;
mod debounce;
mod engine;
mod error;
mod events;
mod guard;
mod rename;
mod service;

pub use classifier::{PathClass, PathClassifier};
pub use debounce::DebounceTable;
pub use engine::{EngineTimings, Reconciler};
pub use error::WatchError;
pub use events::RawEvent;
pub use guard::SelfWriteGuard;
pub use rename::match_publish_rename;
pub use service::WatchService;
