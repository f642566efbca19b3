//! Persistent name-to-identifier tables
//!
//! Long qualified names are compressed into small numeric codes used inside
//! every binary row. Three tables share the same machinery:
//!
//! - QName table: `pkg.entity` string to u16 code
//! - container table: container name to u16 code
//! - singleton table: singleton type name to its fixed 64-bit record id
//!
//! Each table persists into its own versioned system view:
//!
//! ```text
//! partition key     = [view id: u16 BE][view version: u16 BE]
//! clustering column = name string (UTF-8)
//! value             = identifier, big-endian (0 = tombstoned by rename)
//! ```
//!
//! The mapping is a bijection over live names for one application lifetime.
//! Identifiers are allocated monotonically above the system-reserved range
//! and are never reused while stored data may reference them; rename keeps
//! the identifier and tombstones the old name.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::record::{RecordId, FIRST_SINGLETON_ID, MAX_SINGLETON_ID};
use crate::storage::{
    view_pkey, KvPut, KvStore, VersionsView, ViewId, ViewVersion, CONTAINERS_VIEW, QNAMES_VIEW,
    SINGLETONS_VIEW,
};

use super::errors::{NamesError, NamesResult};
use super::qname::{sys, QName};

/// Compact code standing in for a qualified name inside binary rows
pub type QNameId = u16;
/// Compact code standing in for a container name inside binary rows
pub type ContainerId = u16;

/// Identifier of the null qualified name
pub const NULL_QNAME_ID: QNameId = 0;
/// Identifier of the `sys.Error` marker name
pub const ERROR_QNAME_ID: QNameId = 1;
/// Identifier of the built-in `sys.CUD` command
pub const CUD_COMMAND_QNAME_ID: QNameId = 2;
/// First identifier available for application qualified names
pub const FIRST_USER_QNAME_ID: QNameId = 512;

/// Identifier of the absent container
pub const NULL_CONTAINER_ID: ContainerId = 0;
/// First identifier available for application container names
pub const FIRST_USER_CONTAINER_ID: ContainerId = 64;

/// Current layout version of the qnames view
pub const QNAMES_VIEW_VERSION: ViewVersion = 1;
/// Current layout version of the containers view
pub const CONTAINERS_VIEW_VERSION: ViewVersion = 1;
/// Current layout version of the singletons view
pub const SINGLETONS_VIEW_VERSION: ViewVersion = 1;

/// Width of a persisted identifier value in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueWidth {
    U16,
    U64,
}

/// One name table: in-memory maps plus the buffer of unflushed allocations
#[derive(Debug)]
struct NameTable {
    view: ViewId,
    latest_version: ViewVersion,
    width: ValueWidth,
    first_user_id: u64,
    max_id: u64,
    to_id: HashMap<String, u64>,
    to_name: HashMap<u64, String>,
    last_allocated: u64,
    uncommitted: Vec<(String, u64)>,
}

impl NameTable {
    fn new(view: ViewId, latest_version: ViewVersion, width: ValueWidth, first_user_id: u64, max_id: u64) -> Self {
        Self {
            view,
            latest_version,
            width,
            first_user_id,
            max_id,
            to_id: HashMap::new(),
            to_name: HashMap::new(),
            last_allocated: first_user_id - 1,
            uncommitted: Vec::new(),
        }
    }

    fn seed(&mut self, name: String, id: u64) {
        self.to_id.insert(name.clone(), id);
        self.to_name.insert(id, name);
    }

    /// Load the table from its system view.
    ///
    /// A never-initialized view is empty, not an error. A stored version this
    /// build does not understand aborts startup. Tombstones (value 0) are
    /// skipped but still advance nothing; their identifiers stay live for the
    /// names they were re-bound to.
    fn load(&mut self, storage: &dyn KvStore, versions: &VersionsView) -> NamesResult<()> {
        let version = match versions.get(self.view) {
            None => return Ok(()),
            Some(v) if v > self.latest_version => {
                return Err(NamesError::unknown_version(self.view, v, self.latest_version));
            }
            Some(v) => v,
        };

        let pkey = view_pkey(self.view, version);
        let width = self.width;
        let view = self.view;
        let mut cells: Vec<(String, u64)> = Vec::new();
        storage.read_prefix(&pkey, &mut |ccols, value| {
            let name = String::from_utf8(ccols.to_vec()).map_err(|e| {
                crate::storage::StorageError::corruption(format!(
                    "system view {}: name is not UTF-8: {}",
                    view, e
                ))
            })?;
            let id = decode_id(value, width, view)?;
            cells.push((name, id));
            Ok(())
        })?;

        for (name, id) in cells {
            if id == 0 {
                // tombstoned by rename
                continue;
            }
            self.to_id.insert(name.clone(), id);
            self.to_name.insert(id, name);
            if id >= self.first_user_id && id > self.last_allocated {
                self.last_allocated = id;
            }
        }
        Ok(())
    }

    fn id_for(&self, name: &str) -> NamesResult<u64> {
        self.to_id
            .get(name)
            .copied()
            .ok_or_else(|| NamesError::name_not_found(name))
    }

    fn name_for(&self, id: u64) -> NamesResult<&str> {
        self.to_name
            .get(&id)
            .map(String::as_str)
            .ok_or_else(|| NamesError::id_not_found(id))
    }

    /// Returns the existing identifier or allocates the next free one above
    /// the system range. New entries are buffered until `flush`.
    fn allocate_if_absent(&mut self, name: &str) -> NamesResult<u64> {
        if let Some(id) = self.to_id.get(name) {
            return Ok(*id);
        }

        let mut candidate = self.last_allocated.saturating_add(1).max(self.first_user_id);
        while self.to_name.contains_key(&candidate) {
            candidate += 1;
        }
        if candidate > self.max_id {
            return Err(NamesError::ids_exceeded(self.view));
        }

        self.last_allocated = candidate;
        self.to_id.insert(name.to_string(), candidate);
        self.to_name.insert(candidate, name.to_string());
        self.uncommitted.push((name.to_string(), candidate));
        Ok(candidate)
    }

    /// Re-bind an identifier from `old` to `new`, tombstoning `old`.
    fn rename(&mut self, old: &str, new: &str) -> NamesResult<()> {
        if old == new {
            return Err(NamesError::rename_rejected(format!(
                "rename '{}': old and new names are equal",
                old
            )));
        }
        let id = match self.to_id.get(old) {
            Some(id) => *id,
            None => return Err(NamesError::name_not_found(old)),
        };
        if self.to_id.contains_key(new) {
            return Err(NamesError::rename_rejected(format!(
                "rename '{}' to '{}': new name already has an identifier",
                old, new
            )));
        }

        self.to_id.remove(old);
        self.to_id.insert(new.to_string(), id);
        self.to_name.insert(id, new.to_string());
        self.uncommitted.push((old.to_string(), 0));
        self.uncommitted.push((new.to_string(), id));
        Ok(())
    }

    /// Collect the cells persisting buffered allocations, or nothing when no
    /// allocation occurred. The latest view version is written alongside so
    /// a fresh table upgrades in the same batch.
    fn drain_cells(&mut self, versions: &mut VersionsView) -> Vec<KvPut> {
        if self.uncommitted.is_empty() {
            return Vec::new();
        }
        let pkey = view_pkey(self.view, self.latest_version);
        let mut puts: Vec<KvPut> = self
            .uncommitted
            .drain(..)
            .map(|(name, id)| KvPut::new(pkey.clone(), name.into_bytes(), encode_id(id, self.width)))
            .collect();
        puts.push(versions.put(self.view, self.latest_version));
        puts
    }

    fn len(&self) -> usize {
        self.to_id.len()
    }
}

fn encode_id(id: u64, width: ValueWidth) -> Vec<u8> {
    match width {
        ValueWidth::U16 => (id as u16).to_be_bytes().to_vec(),
        ValueWidth::U64 => id.to_be_bytes().to_vec(),
    }
}

fn decode_id(bytes: &[u8], width: ValueWidth, view: ViewId) -> crate::storage::StorageResult<u64> {
    match width {
        ValueWidth::U16 => match bytes {
            [hi, lo] => Ok(u64::from(u16::from_be_bytes([*hi, *lo]))),
            _ => Err(crate::storage::StorageError::corruption(format!(
                "system view {}: expected 2-byte identifier, got {} bytes",
                view,
                bytes.len()
            ))),
        },
        ValueWidth::U64 => {
            let arr: Result<[u8; 8], _> = bytes.try_into();
            match arr {
                Ok(arr) => Ok(u64::from_be_bytes(arr)),
                Err(_) => Err(crate::storage::StorageError::corruption(format!(
                    "system view {}: expected 8-byte identifier, got {} bytes",
                    view,
                    bytes.len()
                ))),
            }
        }
    }
}

/// QName identifier cache.
///
/// Lookups after preparation take the read lock only; allocation and rename
/// re-enter the write lock.
#[derive(Debug)]
pub struct QNameCache {
    table: RwLock<NameTable>,
}

impl QNameCache {
    /// Create a cache seeded with the fixed system identifiers
    pub fn new() -> Self {
        let mut table = NameTable::new(
            QNAMES_VIEW,
            QNAMES_VIEW_VERSION,
            ValueWidth::U16,
            u64::from(FIRST_USER_QNAME_ID),
            u64::from(u16::MAX),
        );
        table.seed(sys::qname_error().to_string(), u64::from(ERROR_QNAME_ID));
        table.seed(sys::qname_cud().to_string(), u64::from(CUD_COMMAND_QNAME_ID));
        Self {
            table: RwLock::new(table),
        }
    }

    /// Load persisted entries from storage
    pub fn load(&self, storage: &dyn KvStore, versions: &VersionsView) -> NamesResult<()> {
        self.write().load(storage, versions)
    }

    /// Resolve a qualified name to its identifier
    pub fn id_for(&self, name: &QName) -> NamesResult<QNameId> {
        if name.is_null() {
            return Ok(NULL_QNAME_ID);
        }
        Ok(self.read().id_for(&name.to_string())? as QNameId)
    }

    /// Resolve an identifier back to its qualified name
    pub fn name_for(&self, id: QNameId) -> NamesResult<QName> {
        if id == NULL_QNAME_ID {
            return Ok(QName::null());
        }
        let table = self.read();
        let name = table.name_for(u64::from(id))?;
        QName::parse(name).map_err(|_| NamesError::id_not_found(u64::from(id)))
    }

    /// Resolve or allocate the identifier for a qualified name
    pub fn allocate_if_absent(&self, name: &QName) -> NamesResult<QNameId> {
        if name.is_null() {
            return Ok(NULL_QNAME_ID);
        }
        Ok(self.write().allocate_if_absent(&name.to_string())? as QNameId)
    }

    /// Re-bind an identifier to a new name, keeping the numeric code so
    /// stored rows stay valid. Fails if `old` is unknown, `new` is already
    /// bound or the two are equal.
    pub fn rename(&self, old: &QName, new: &QName) -> NamesResult<()> {
        self.write().rename(&old.to_string(), &new.to_string())
    }

    /// Persist buffered allocations in one batch; no-op when none occurred
    pub fn flush(
        &self,
        storage: &mut dyn KvStore,
        versions: &mut VersionsView,
    ) -> NamesResult<usize> {
        let puts = self.write().drain_cells(versions);
        if puts.is_empty() {
            return Ok(0);
        }
        let count = puts.len() - 1;
        storage.put_batch(puts)?;
        Ok(count)
    }

    /// Number of live names, system seeds included
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true when no names are cached beyond the system seeds
    pub fn is_empty(&self) -> bool {
        self.len() <= 2
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, NameTable> {
        match self.table.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, NameTable> {
        match self.table.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for QNameCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Container-name identifier cache
#[derive(Debug)]
pub struct ContainerCache {
    table: RwLock<NameTable>,
}

impl ContainerCache {
    /// Create an empty container cache
    pub fn new() -> Self {
        Self {
            table: RwLock::new(NameTable::new(
                CONTAINERS_VIEW,
                CONTAINERS_VIEW_VERSION,
                ValueWidth::U16,
                u64::from(FIRST_USER_CONTAINER_ID),
                u64::from(u16::MAX),
            )),
        }
    }

    /// Load persisted entries from storage
    pub fn load(&self, storage: &dyn KvStore, versions: &VersionsView) -> NamesResult<()> {
        self.write().load(storage, versions)
    }

    /// Resolve a container name to its identifier
    pub fn id_for(&self, name: &str) -> NamesResult<ContainerId> {
        if name.is_empty() {
            return Ok(NULL_CONTAINER_ID);
        }
        Ok(self.read().id_for(name)? as ContainerId)
    }

    /// Resolve an identifier back to its container name
    pub fn name_for(&self, id: ContainerId) -> NamesResult<String> {
        if id == NULL_CONTAINER_ID {
            return Ok(String::new());
        }
        Ok(self.read().name_for(u64::from(id))?.to_string())
    }

    /// Resolve or allocate the identifier for a container name
    pub fn allocate_if_absent(&self, name: &str) -> NamesResult<ContainerId> {
        if name.is_empty() {
            return Ok(NULL_CONTAINER_ID);
        }
        Ok(self.write().allocate_if_absent(name)? as ContainerId)
    }

    /// Persist buffered allocations in one batch; no-op when none occurred
    pub fn flush(
        &self,
        storage: &mut dyn KvStore,
        versions: &mut VersionsView,
    ) -> NamesResult<usize> {
        let puts = self.write().drain_cells(versions);
        if puts.is_empty() {
            return Ok(0);
        }
        let count = puts.len() - 1;
        storage.put_batch(puts)?;
        Ok(count)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, NameTable> {
        match self.table.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, NameTable> {
        match self.table.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ContainerCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Singleton-instance identifier cache.
///
/// A singleton type has at most one live instance; its storage identifier
/// comes from this table, never from the commit-time id generator, so the
/// same type always resolves to the same record id.
#[derive(Debug)]
pub struct SingletonCache {
    table: RwLock<NameTable>,
}

impl SingletonCache {
    /// Create an empty singleton cache
    pub fn new() -> Self {
        Self {
            table: RwLock::new(NameTable::new(
                SINGLETONS_VIEW,
                SINGLETONS_VIEW_VERSION,
                ValueWidth::U64,
                FIRST_SINGLETON_ID,
                MAX_SINGLETON_ID,
            )),
        }
    }

    /// Load persisted entries from storage
    pub fn load(&self, storage: &dyn KvStore, versions: &VersionsView) -> NamesResult<()> {
        self.write().load(storage, versions)
    }

    /// Resolve a singleton type to its fixed record id
    pub fn id_for(&self, name: &QName) -> NamesResult<RecordId> {
        Ok(RecordId::new(self.read().id_for(&name.to_string())?))
    }

    /// Resolve a record id in the singleton range back to its type
    pub fn name_for(&self, id: RecordId) -> NamesResult<QName> {
        let table = self.read();
        let name = table.name_for(id.as_u64())?;
        QName::parse(name).map_err(|_| NamesError::id_not_found(id.as_u64()))
    }

    /// Resolve or allocate the fixed record id for a singleton type
    pub fn allocate_if_absent(&self, name: &QName) -> NamesResult<RecordId> {
        Ok(RecordId::new(
            self.write().allocate_if_absent(&name.to_string())?,
        ))
    }

    /// Persist buffered allocations in one batch; no-op when none occurred
    pub fn flush(
        &self,
        storage: &mut dyn KvStore,
        versions: &mut VersionsView,
    ) -> NamesResult<usize> {
        let puts = self.write().drain_cells(versions);
        if puts.is_empty() {
            return Ok(0);
        }
        let count = puts.len() - 1;
        storage.put_batch(puts)?;
        Ok(count)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, NameTable> {
        match self.table.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, NameTable> {
        match self.table.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for SingletonCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    fn flush_all(cache: &QNameCache, storage: &mut MemStorage, versions: &mut VersionsView) {
        cache.flush(storage, versions).unwrap();
    }

    #[test]
    fn test_system_seeds_are_fixed() {
        let cache = QNameCache::new();
        assert_eq!(cache.id_for(&QName::null()).unwrap(), NULL_QNAME_ID);
        assert_eq!(cache.id_for(&sys::qname_error()).unwrap(), ERROR_QNAME_ID);
        assert_eq!(cache.id_for(&sys::qname_cud()).unwrap(), CUD_COMMAND_QNAME_ID);
        assert_eq!(cache.name_for(NULL_QNAME_ID).unwrap(), QName::null());
    }

    #[test]
    fn test_allocate_is_monotone_and_stable() {
        let cache = QNameCache::new();
        let a = cache.allocate_if_absent(&QName::new("app", "first")).unwrap();
        let b = cache.allocate_if_absent(&QName::new("app", "second")).unwrap();
        assert_eq!(a, FIRST_USER_QNAME_ID);
        assert_eq!(b, FIRST_USER_QNAME_ID + 1);
        // repeated call returns the same identifier
        assert_eq!(
            cache.allocate_if_absent(&QName::new("app", "first")).unwrap(),
            a
        );
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let cache = QNameCache::new();
        let err = cache.id_for(&QName::new("app", "missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_flush_then_reload() {
        let mut storage = MemStorage::new();
        let mut versions = VersionsView::new();
        let cache = QNameCache::new();
        let name = QName::new("app", "doc");
        let id = cache.allocate_if_absent(&name).unwrap();
        flush_all(&cache, &mut storage, &mut versions);

        let mut versions2 = VersionsView::new();
        versions2.load(&storage).unwrap();
        let reloaded = QNameCache::new();
        reloaded.load(&storage, &versions2).unwrap();
        assert_eq!(reloaded.id_for(&name).unwrap(), id);
        assert_eq!(reloaded.name_for(id).unwrap(), name);
    }

    #[test]
    fn test_flush_without_allocations_writes_nothing() {
        let mut storage = MemStorage::new();
        let mut versions = VersionsView::new();
        let cache = QNameCache::new();
        assert_eq!(cache.flush(&mut storage, &mut versions).unwrap(), 0);
        assert_eq!(storage.cell_count(), 0);
    }

    #[test]
    fn test_reload_continues_allocation_above_stored_ids() {
        let mut storage = MemStorage::new();
        let mut versions = VersionsView::new();
        let cache = QNameCache::new();
        cache.allocate_if_absent(&QName::new("app", "a")).unwrap();
        cache.allocate_if_absent(&QName::new("app", "b")).unwrap();
        flush_all(&cache, &mut storage, &mut versions);

        let mut versions2 = VersionsView::new();
        versions2.load(&storage).unwrap();
        let reloaded = QNameCache::new();
        reloaded.load(&storage, &versions2).unwrap();
        let next = reloaded.allocate_if_absent(&QName::new("app", "c")).unwrap();
        assert_eq!(next, FIRST_USER_QNAME_ID + 2);
    }

    #[test]
    fn test_rename_preserves_identifier() {
        let cache = QNameCache::new();
        let old = QName::new("app", "old");
        let new = QName::new("app", "new");
        let id = cache.allocate_if_absent(&old).unwrap();

        cache.rename(&old, &new).unwrap();
        assert_eq!(cache.id_for(&new).unwrap(), id);
        assert!(cache.id_for(&old).unwrap_err().is_not_found());
        assert_eq!(cache.name_for(id).unwrap(), new);
    }

    #[test]
    fn test_rename_preconditions() {
        let cache = QNameCache::new();
        let a = QName::new("app", "a");
        let b = QName::new("app", "b");
        cache.allocate_if_absent(&a).unwrap();
        cache.allocate_if_absent(&b).unwrap();

        assert!(cache.rename(&a, &a).is_err());
        assert!(cache.rename(&QName::new("app", "ghost"), &b).is_err());
        assert!(cache.rename(&a, &b).is_err());
    }

    #[test]
    fn test_rename_tombstone_skipped_on_reload() {
        let mut storage = MemStorage::new();
        let mut versions = VersionsView::new();
        let cache = QNameCache::new();
        let old = QName::new("app", "old");
        let new = QName::new("app", "new");
        let id = cache.allocate_if_absent(&old).unwrap();
        cache.rename(&old, &new).unwrap();
        flush_all(&cache, &mut storage, &mut versions);

        let mut versions2 = VersionsView::new();
        versions2.load(&storage).unwrap();
        let reloaded = QNameCache::new();
        reloaded.load(&storage, &versions2).unwrap();
        assert!(reloaded.id_for(&old).unwrap_err().is_not_found());
        assert_eq!(reloaded.id_for(&new).unwrap(), id);
    }

    #[test]
    fn test_newer_stored_version_is_fatal() {
        let mut storage = MemStorage::new();
        let mut versions = VersionsView::new();
        let cell = versions.put(QNAMES_VIEW, QNAMES_VIEW_VERSION + 1);
        storage.put_batch(vec![cell]).unwrap();

        let cache = QNameCache::new();
        let err = cache.load(&storage, &versions).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_container_cache_contract() {
        let cache = ContainerCache::new();
        assert_eq!(cache.id_for("").unwrap(), NULL_CONTAINER_ID);
        let id = cache.allocate_if_absent("items").unwrap();
        assert_eq!(id, FIRST_USER_CONTAINER_ID);
        assert_eq!(cache.name_for(id).unwrap(), "items");
    }

    #[test]
    fn test_singleton_ids_live_in_their_range() {
        let cache = SingletonCache::new();
        let id = cache
            .allocate_if_absent(&QName::new("app", "settings"))
            .unwrap();
        assert!(id.as_u64() >= FIRST_SINGLETON_ID);
        assert!(id.as_u64() <= MAX_SINGLETON_ID);
        assert!(id.is_singleton());
        // stable across calls
        assert_eq!(
            cache
                .allocate_if_absent(&QName::new("app", "settings"))
                .unwrap(),
            id
        );
    }
}
