//! Version tracking for system views
//!
//! Every system view (identifier tables and the versions table itself) is
//! stored under a partition key derived from its view identifier and view
//! version:
//!
//! ```text
//! partition key     = [view id: u16 BE][view version: u16 BE]
//! clustering column = record-specific (name string, view id, ...)
//! value             = record-specific (u16 BE identifier, ...)
//! ```
//!
//! The versions view maps view id to the version its data is stored under.
//! A stored version newer than what this build understands is a fatal
//! configuration error; a missing version means the view was never
//! initialized and reads as empty.

use std::collections::HashMap;

use super::errors::{StorageError, StorageResult};
use super::kv::{KvPut, KvStore};

/// System view identifier
pub type ViewId = u16;
/// Version of a system view's storage layout
pub type ViewVersion = u16;

/// The versions view itself
pub const VERSIONS_VIEW: ViewId = 1;
/// QName identifier table
pub const QNAMES_VIEW: ViewId = 2;
/// Container-name identifier table
pub const CONTAINERS_VIEW: ViewId = 3;
/// Singleton-instance identifier table
pub const SINGLETONS_VIEW: ViewId = 4;

/// Current layout version of the versions view
pub const VERSIONS_VIEW_VERSION: ViewVersion = 1;

/// Builds the partition key for a system view at a given version
pub fn view_pkey(view: ViewId, version: ViewVersion) -> Vec<u8> {
    let mut pkey = Vec::with_capacity(4);
    pkey.extend_from_slice(&view.to_be_bytes());
    pkey.extend_from_slice(&version.to_be_bytes());
    pkey
}

/// In-memory copy of the versions view, loaded once at preparation
#[derive(Debug, Default)]
pub struct VersionsView {
    versions: HashMap<ViewId, ViewVersion>,
}

impl VersionsView {
    /// Create an empty versions view
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the versions view from storage.
    ///
    /// Cells are keyed by view id (u16 BE) with a u16 BE version value.
    /// Malformed cells are a corruption error, not a silent skip.
    pub fn load(&mut self, storage: &dyn KvStore) -> StorageResult<()> {
        self.versions.clear();
        let pkey = view_pkey(VERSIONS_VIEW, VERSIONS_VIEW_VERSION);
        let versions = &mut self.versions;
        storage.read_prefix(&pkey, &mut |ccols, value| {
            let view = decode_u16(ccols, "versions view key")?;
            let version = decode_u16(value, "versions view value")?;
            versions.insert(view, version);
            Ok(())
        })
    }

    /// Returns the stored version of a view, or `None` if never initialized
    pub fn get(&self, view: ViewId) -> Option<ViewVersion> {
        self.versions.get(&view).copied()
    }

    /// Record a view version in memory and return the cell that persists it
    pub fn put(&mut self, view: ViewId, version: ViewVersion) -> KvPut {
        self.versions.insert(view, version);
        KvPut::new(
            view_pkey(VERSIONS_VIEW, VERSIONS_VIEW_VERSION),
            view.to_be_bytes().to_vec(),
            version.to_be_bytes().to_vec(),
        )
    }
}

fn decode_u16(bytes: &[u8], what: &str) -> StorageResult<u16> {
    match bytes {
        [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(StorageError::corruption(format!(
            "{}: expected 2 bytes, got {}",
            what,
            bytes.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    #[test]
    fn test_missing_view_reads_as_none() {
        let storage = MemStorage::new();
        let mut versions = VersionsView::new();
        versions.load(&storage).unwrap();
        assert_eq!(versions.get(QNAMES_VIEW), None);
    }

    #[test]
    fn test_put_then_reload() {
        let mut storage = MemStorage::new();
        let mut versions = VersionsView::new();
        let cell = versions.put(QNAMES_VIEW, 1);
        storage.put_batch(vec![cell]).unwrap();

        let mut reloaded = VersionsView::new();
        reloaded.load(&storage).unwrap();
        assert_eq!(reloaded.get(QNAMES_VIEW), Some(1));
        assert_eq!(reloaded.get(CONTAINERS_VIEW), None);
    }

    #[test]
    fn test_malformed_cell_is_corruption() {
        let mut storage = MemStorage::new();
        storage
            .put_batch(vec![KvPut::new(
                view_pkey(VERSIONS_VIEW, VERSIONS_VIEW_VERSION),
                vec![0, 2],
                vec![1, 2, 3],
            )])
            .unwrap();

        let mut versions = VersionsView::new();
        let err = versions.load(&storage).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_view_pkey_is_big_endian() {
        assert_eq!(view_pkey(0x0102, 0x0304), vec![0x01, 0x02, 0x03, 0x04]);
    }
}
