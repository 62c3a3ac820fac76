//! The attribute record side-store.
//!
//! A record per watched file, holding the xattrs the sync client would
//! otherwise lose. The reconciliation engine drives the store through
//! the [`AttributeStore`] trait; the filesystem implementation lives in
//! [`FilesystemAttributeStore`].

mod error;
mod record;
mod store;

pub use error::StoreError;
pub use record::{AttributeRecord, RECORD_SUFFIX};
pub use store::{AttributeStore, FilesystemAttributeStore};
