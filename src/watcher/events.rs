//! Raw filesystem events as the engine sees them.
//!
//! The notify backend reports a zoo of event kinds that differ across
//! platforms; the reconciliation rules only care about three shapes.
//! Delivery is at-least-once and may be reordered or duplicated, so the
//! mapping errs on the side of reporting and lets the engine's debouncing
//! and idempotent actions absorb the noise.

use std::path::PathBuf;

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

/// A filesystem notification, flattened to the shapes the engine handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// Content or metadata of `path` changed.
    Modified(PathBuf),
    /// `from` was renamed to `to`.
    Moved { from: PathBuf, to: PathBuf },
    /// `path` was removed.
    Deleted(PathBuf),
}

impl RawEvent {
    /// Flatten a notify event into zero or more raw events.
    ///
    /// Creations map to `Modified` so files that appear without a rename
    /// still get captured; an unpaired rename-away maps to `Deleted`
    /// because the old identity is gone either way.
    pub fn from_notify(event: notify::Event) -> Vec<RawEvent> {
        let mut paths = event.paths;
        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
                match (paths.pop(), paths.pop()) {
                    (Some(to), Some(from)) => vec![RawEvent::Moved { from, to }],
                    _ => Vec::new(),
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.into_iter().map(RawEvent::Deleted).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) | EventKind::Create(_) => {
                paths.into_iter().map(RawEvent::Modified).collect()
            }
            EventKind::Modify(_) => paths.into_iter().map(RawEvent::Modified).collect(),
            EventKind::Remove(_) => paths.into_iter().map(RawEvent::Deleted).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut e = notify::Event::new(kind);
        e.paths = paths.iter().map(PathBuf::from).collect();
        e
    }

    #[test]
    fn test_rename_pair_becomes_moved() {
        let raw = RawEvent::from_notify(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/root/.doc.txt.~1f", "/root/doc.txt"],
        ));
        assert_eq!(
            raw,
            vec![RawEvent::Moved {
                from: PathBuf::from("/root/.doc.txt.~1f"),
                to: PathBuf::from("/root/doc.txt"),
            }]
        );
    }

    #[test]
    fn test_data_change_becomes_modified() {
        let raw = RawEvent::from_notify(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/root/doc.txt"],
        ));
        assert_eq!(raw, vec![RawEvent::Modified(PathBuf::from("/root/doc.txt"))]);
    }

    #[test]
    fn test_create_becomes_modified() {
        let raw = RawEvent::from_notify(event(
            EventKind::Create(CreateKind::File),
            &["/root/new.txt"],
        ));
        assert_eq!(raw, vec![RawEvent::Modified(PathBuf::from("/root/new.txt"))]);
    }

    #[test]
    fn test_remove_and_unpaired_rename_become_deleted() {
        let raw = RawEvent::from_notify(event(
            EventKind::Remove(RemoveKind::File),
            &["/root/doc.txt"],
        ));
        assert_eq!(raw, vec![RawEvent::Deleted(PathBuf::from("/root/doc.txt"))]);

        let raw = RawEvent::from_notify(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/root/doc.txt"],
        ));
        assert_eq!(raw, vec![RawEvent::Deleted(PathBuf::from("/root/doc.txt"))]);
    }

    #[test]
    fn test_access_events_are_dropped() {
        let raw = RawEvent::from_notify(event(EventKind::Access(
            notify::event::AccessKind::Read,
        ), &["/root/doc.txt"]));
        assert!(raw.is_empty());
    }
}
