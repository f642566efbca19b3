//! Create/update operation sets
//!
//! A CUD set is the mutation half of an event: ordered creates (fresh,
//! raw-identified records) and a map of pending updates keyed by the
//! target identifier. An update keeps the original record as loaded from
//! storage, the delta row and the computed result; an update rehydrated
//! after a restart arrives without its original and loads it lazily before
//! it can be applied.

use std::collections::BTreeMap;

use crate::record::{Record, RecordId};
use crate::row::{BuildErrors, Row};
use crate::storage::StorageError;

use super::errors::{EventError, EventResult};

/// One pending update
#[derive(Debug, Clone, PartialEq)]
pub struct CudUpdate {
    original: Option<Record>,
    changes: Row,
    result: Option<Record>,
}

impl CudUpdate {
    /// The record as loaded from storage, absent until rehydrated
    pub fn original(&self) -> Option<&Record> {
        self.original.as_ref()
    }

    /// The delta row
    pub fn changes(&self) -> &Row {
        &self.changes
    }

    /// The delta row, mutably
    pub fn changes_mut(&mut self) -> &mut Row {
        &mut self.changes
    }

    /// The record with the delta applied, absent until computed
    pub fn result(&self) -> Option<&Record> {
        self.result.as_ref()
    }

    /// The computed result, mutably (identifier regeneration rewrites it)
    pub fn result_mut(&mut self) -> Option<&mut Record> {
        self.result.as_mut()
    }
}

/// Ordered creates plus identifier-keyed updates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CudSet {
    creates: Vec<Record>,
    updates: BTreeMap<RecordId, CudUpdate>,
}

impl CudSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the set holds no operation
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty()
    }

    /// Append a create operation.
    ///
    /// The record must carry an identifier; creates are raw-identified
    /// until commit-time regeneration.
    pub fn add_create(&mut self, record: Record) -> EventResult<&mut Record> {
        if record.id().is_null() {
            return Err(EventError::NullCreateId(record.qname().clone()));
        }
        self.creates.push(record);
        let idx = self.creates.len() - 1;
        Ok(&mut self.creates[idx])
    }

    /// The create operations, in declaration order
    pub fn creates(&self) -> &[Record] {
        &self.creates
    }

    /// The create operations, mutably
    pub fn creates_mut(&mut self) -> &mut [Record] {
        &mut self.creates
    }

    /// Register an update of `original` and return its delta row.
    ///
    /// At most one update may target an identifier.
    pub fn add_update(&mut self, original: Record) -> EventResult<&mut Row> {
        let id = original.id();
        if self.updates.contains_key(&id) {
            return Err(EventError::DuplicateUpdate(id));
        }
        let mut changes = Row::new(original.row().layout().clone());
        changes.set_id(id);
        changes.set_parent(original.parent());
        changes.set_container(original.container());
        changes.set_active(original.is_active());
        let entry = self.updates.entry(id).or_insert(CudUpdate {
            original: Some(original),
            changes,
            result: None,
        });
        Ok(&mut entry.changes)
    }

    /// Register a rehydrated update: the delta as decoded from stored
    /// bytes, the original to be loaded lazily
    pub(crate) fn add_update_changes(&mut self, changes: Row) -> EventResult<()> {
        let id = changes.id();
        if self.updates.contains_key(&id) {
            return Err(EventError::DuplicateUpdate(id));
        }
        self.updates.insert(
            id,
            CudUpdate {
                original: None,
                changes,
                result: None,
            },
        );
        Ok(())
    }

    /// The update targeting an identifier, if any
    pub fn update(&self, id: RecordId) -> Option<&CudUpdate> {
        self.updates.get(&id)
    }

    /// Pending updates in identifier order
    pub fn updates(&self) -> impl Iterator<Item = (&RecordId, &CudUpdate)> {
        self.updates.iter()
    }

    /// Pending updates, mutably
    pub fn updates_mut(&mut self) -> impl Iterator<Item = (&RecordId, &mut CudUpdate)> {
        self.updates.iter_mut()
    }

    /// Number of pending updates
    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    /// Build every create and delta row, joining all problems.
    ///
    /// Delta rows are checked for collected rejections only; a delta
    /// legitimately omits required fields.
    pub fn build(&self) -> Result<(), BuildErrors> {
        let mut errs = BuildErrors::new();
        for create in &self.creates {
            if let Err(e) = create.build() {
                errs.merge(e);
            }
        }
        for update in self.updates.values() {
            errs.merge(update.changes.collected_issues());
        }
        errs.into_result()
    }

    /// Compute the result record of every update from its original plus
    /// delta. Fails for updates whose original is still missing.
    pub fn apply(&mut self) -> EventResult<()> {
        for (id, update) in self.updates.iter_mut() {
            let original = match &update.original {
                Some(o) => o,
                None => return Err(EventError::MissingOriginal(*id)),
            };
            update.result = Some(apply_changes(original, &update.changes));
        }
        Ok(())
    }

    /// Load missing originals through `loader`, then apply.
    ///
    /// Used when an event is rehydrated from stored bytes after a restart:
    /// the delta was persisted, the original lives in storage.
    pub fn rehydrate(
        &mut self,
        loader: &mut dyn FnMut(RecordId) -> Result<Option<Record>, StorageError>,
    ) -> EventResult<()> {
        for (id, update) in self.updates.iter_mut() {
            if update.original.is_none() {
                match loader(*id)? {
                    Some(original) => update.original = Some(original),
                    None => return Err(EventError::MissingOriginal(*id)),
                }
            }
        }
        self.apply()
    }

    /// Redact user field values on every row in the set
    pub fn mask_values(&mut self) {
        for create in &mut self.creates {
            create.mask_values();
        }
        for update in self.updates.values_mut() {
            if let Some(original) = &mut update.original {
                original.mask_values();
            }
            update.changes.mask_values();
            if let Some(result) = &mut update.result {
                result.mask_values();
            }
        }
    }

    /// Release every row in the set
    pub fn release(&mut self) {
        for create in &mut self.creates {
            create.release();
        }
        for update in self.updates.values_mut() {
            if let Some(original) = &mut update.original {
                original.release();
            }
            update.changes.release();
            if let Some(result) = &mut update.result {
                result.release();
            }
        }
    }
}

/// Overlay a delta row onto its original: set fields win, explicit nils
/// clear, everything else keeps the original value. Identity and linkage
/// come from the original; the active flag comes from the delta.
fn apply_changes(original: &Record, changes: &Row) -> Record {
    let mut result = original.clone();
    for idx in 0..changes.layout().len() {
        if let Some(value) = changes.value_at(idx) {
            result.row_mut().put_decoded(idx, value.clone());
        }
    }
    for idx in changes.nil_indexes() {
        result.row_mut().put_nil(idx);
    }
    result.set_active(changes.is_active());
    result
}
