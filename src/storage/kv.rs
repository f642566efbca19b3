//! Key-value storage collaborator interface
//!
//! The engine persists system records (identifier tables, view versions)
//! through this interface and never touches the physical backend directly.
//! Keys are an opaque partition-key / clustering-column byte pair. The
//! backend is expected to provide point gets, ordered prefix reads and
//! atomic batched puts.

use std::collections::BTreeMap;

use super::errors::StorageResult;

/// One cell of a batched write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPut {
    /// Partition key
    pub pkey: Vec<u8>,
    /// Clustering columns within the partition
    pub ccols: Vec<u8>,
    /// Cell value
    pub value: Vec<u8>,
}

impl KvPut {
    /// Create a cell for a batched write
    pub fn new(pkey: Vec<u8>, ccols: Vec<u8>, value: Vec<u8>) -> Self {
        Self { pkey, ccols, value }
    }
}

/// Storage backend contract consumed by the engine.
///
/// Implementations must keep clustering columns ordered within a partition
/// so prefix reads visit cells in ascending column order. `put_batch` must
/// apply all cells or none.
pub trait KvStore {
    /// Point read of a single cell. Returns `None` when the cell does not
    /// exist, which callers must distinguish from read failures.
    fn get(&self, pkey: &[u8], ccols: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Ordered read of every cell under a partition key. The callback is
    /// invoked once per cell with (clustering columns, value).
    fn read_prefix(
        &self,
        pkey: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> StorageResult<()>,
    ) -> StorageResult<()>;

    /// Atomically apply a batch of cell writes.
    fn put_batch(&mut self, puts: Vec<KvPut>) -> StorageResult<()>;
}

/// In-memory storage backend.
///
/// Used by tests and embedders that do not need persistence. Cells are held
/// in ordered maps so prefix reads are deterministic.
#[derive(Debug, Default)]
pub struct MemStorage {
    partitions: BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStorage {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cells across all partitions
    pub fn cell_count(&self) -> usize {
        self.partitions.values().map(|p| p.len()).sum()
    }
}

impl KvStore for MemStorage {
    fn get(&self, pkey: &[u8], ccols: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .partitions
            .get(pkey)
            .and_then(|p| p.get(ccols))
            .cloned())
    }

    fn read_prefix(
        &self,
        pkey: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> StorageResult<()>,
    ) -> StorageResult<()> {
        if let Some(partition) = self.partitions.get(pkey) {
            for (ccols, value) in partition {
                visit(ccols, value)?;
            }
        }
        Ok(())
    }

    fn put_batch(&mut self, puts: Vec<KvPut>) -> StorageResult<()> {
        for put in puts {
            self.partitions
                .entry(put.pkey)
                .or_default()
                .insert(put.ccols, put.value);
        }
        Ok(())
    }
}
