//! Identifier regeneration for emberdb
//!
//! Converts the client-supplied raw record identifiers of an event into
//! globally unique storage identifiers at commit time, and propagates the
//! substitution through every internal reference.
//!
//! Two passes over the event:
//!
//! 1. every create operation and every identified argument-tree node gets
//!    a storage identifier for its raw one; singleton types resolve
//!    through the singleton cache, never the generator;
//! 2. every reference field and parent link holding a raw identifier is
//!    rewritten from the pass-one table, then the owning row is rebuilt.
//!
//! The passes run in document order, so a child's parent link resolves
//! through the table even though the parent was rewritten earlier in the
//! same walk. After a successful pass no raw identifier remains; running
//! again on a new event is rejected, on a synced event it is a no-op.

use std::collections::HashMap;

use thiserror::Error;

use crate::event::Event;
use crate::names::{NamesError, QName};
use crate::record::RecordId;
use crate::row::{AppContext, BuildErrors, Row, Value};
use crate::schema::DataKind;

/// Supplies storage identifiers at commit time.
///
/// `next_id` allocates the replacement for one raw identifier;
/// `note_sync_id` reports an identifier that arrived already resolved (a
/// synced event replayed from a secondary source) so the generator's own
/// counter stays consistent.
pub trait IdGenerator {
    /// Allocate the storage identifier replacing `raw` for a record of
    /// type `qname`
    fn next_id(&mut self, raw: RecordId, qname: &QName) -> Result<RecordId, RegenError>;

    /// Observe an identifier that is already in storage range
    fn note_sync_id(&mut self, _id: RecordId, _qname: &QName) {}
}

/// Regeneration failures
#[derive(Debug, Error)]
pub enum RegenError {
    /// A create in a new (non-synchronized) event carries a non-raw id
    #[error("record id {id} of '{qname}' is not raw; new events must use raw identifiers")]
    NonRawId {
        /// The offending identifier
        id: RecordId,
        /// Type of the offending record
        qname: QName,
    },

    /// A reference holds a raw id with no pass-one replacement
    #[error("raw id {0} has no replacement in this event")]
    UnknownRawReference(RecordId),

    /// The generator could not allocate
    #[error("id generation failed: {0}")]
    Generator(String),

    /// Singleton lookup failed
    #[error(transparent)]
    Names(#[from] NamesError),

    /// A rewritten row no longer builds
    #[error(transparent)]
    Build(#[from] BuildErrors),
}

/// Rewrite every raw identifier in `event` to a storage identifier.
pub fn regenerate_event_ids(
    event: &mut Event,
    ctx: &dyn AppContext,
    generator: &mut dyn IdGenerator,
) -> Result<(), RegenError> {
    let is_sync = event.context().is_synced();
    let mut table: HashMap<RecordId, RecordId> = HashMap::new();

    // pass one: assign storage ids to creates and identified tree nodes
    for create in event.cud_mut().creates_mut() {
        let assigned = assign_id(create.row_mut(), ctx, generator, is_sync, &mut table)?;
        if let Some(id) = assigned {
            create.set_id(id);
        }
    }
    if let Some(tree) = event.argument_mut() {
        for (_, node) in tree.iter_mut() {
            if !node.row().layout().sys().id {
                continue;
            }
            let assigned = assign_id(node.row_mut(), ctx, generator, is_sync, &mut table)?;
            if let Some(id) = assigned {
                node.row_mut().set_id(id);
            }
        }
    }

    // pass two: substitute references and parent links, rebuild the rows
    for create in event.cud_mut().creates_mut() {
        substitute_refs(create.row_mut(), &table)?;
        create.build()?;
    }
    for (_, update) in event.cud_mut().updates_mut() {
        substitute_refs(update.changes_mut(), &table)?;
        if let Some(result) = update.result_mut() {
            substitute_refs(result.row_mut(), &table)?;
            result.build()?;
        }
    }
    if let Some(tree) = event.argument_mut() {
        for (_, node) in tree.iter_mut() {
            substitute_refs(node.row_mut(), &table)?;
            node.row_mut().build()?;
        }
    }
    Ok(())
}

/// Decide the storage id for one identified row. Returns the new id when
/// the row's id was raw and got replaced.
fn assign_id(
    row: &mut Row,
    ctx: &dyn AppContext,
    generator: &mut dyn IdGenerator,
    is_sync: bool,
    table: &mut HashMap<RecordId, RecordId>,
) -> Result<Option<RecordId>, RegenError> {
    let id = row.id();
    let qname = row.qname().clone();

    if id.is_raw() {
        let new_id = if row.layout().is_singleton() {
            // a singleton's identifier is fixed by the cache so at most
            // one instance can ever exist
            ctx.singleton_id(&qname)?
        } else {
            generator.next_id(id, &qname)?
        };
        table.insert(id, new_id);
        return Ok(Some(new_id));
    }

    if !id.is_null() {
        if is_sync {
            generator.note_sync_id(id, &qname);
        } else {
            return Err(RegenError::NonRawId { id, qname });
        }
    }
    Ok(None)
}

/// Rewrite raw reference fields and the parent link from the pass-one table
fn substitute_refs(row: &mut Row, table: &HashMap<RecordId, RecordId>) -> Result<(), RegenError> {
    let parent = row.parent();
    if parent.is_raw() {
        let new = table
            .get(&parent)
            .copied()
            .ok_or(RegenError::UnknownRawReference(parent))?;
        row.set_parent(new);
    }

    for idx in 0..row.layout().len() {
        let is_ref = row
            .layout()
            .field_at(idx)
            .map(|f| f.data_kind == DataKind::RecordId)
            .unwrap_or(false);
        if !is_ref {
            continue;
        }
        let current = match row.value_at(idx) {
            Some(Value::RecordId(id)) => Some(*id),
            _ => None,
        };
        if let Some(id) = current {
            if id.is_raw() {
                let new = table
                    .get(&id)
                    .copied()
                    .ok_or(RegenError::UnknownRawReference(id))?;
                row.put_decoded(idx, Value::RecordId(new));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBuilder, EventContext};
    use crate::names::sys;
    use crate::record::FIRST_STORAGE_ID;
    use crate::row::testctx::TestCtx;
    use crate::schema::{FieldDef, Schemas, TypeDef, TypeKind};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    /// Allocates sequential ids in one bucket and records sync reports
    struct SeqGenerator {
        next: u64,
        synced: Vec<RecordId>,
    }

    impl SeqGenerator {
        fn new() -> Self {
            Self {
                next: 0,
                synced: Vec::new(),
            }
        }
    }

    impl IdGenerator for SeqGenerator {
        fn next_id(&mut self, _raw: RecordId, _qname: &QName) -> Result<RecordId, RegenError> {
            let id = RecordId::from_parts(1, self.next);
            self.next += 1;
            Ok(id)
        }

        fn note_sync_id(&mut self, id: RecordId, _qname: &QName) {
            self.synced.push(id);
        }
    }

    fn schemas() -> Schemas {
        let mut schemas = Schemas::new();
        schemas
            .add_type(
                TypeDef::new(QName::new("app", "dept"), TypeKind::Doc)
                    .with_field(FieldDef::required("name", DataKind::String)),
            )
            .unwrap();
        schemas
            .add_type(
                TypeDef::new(QName::new("app", "person"), TypeKind::Doc)
                    .with_field(FieldDef::required("name", DataKind::String))
                    .with_field(FieldDef::optional("dept", DataKind::RecordId)),
            )
            .unwrap();
        schemas
            .add_type(
                TypeDef::new(QName::new("app", "member"), TypeKind::Record)
                    .with_field(FieldDef::required("name", DataKind::String)),
            )
            .unwrap();
        schemas
            .add_type(
                TypeDef::new(QName::new("app", "settings"), TypeKind::Doc)
                    .singleton()
                    .with_field(FieldDef::optional("theme", DataKind::String)),
            )
            .unwrap();
        schemas
    }

    fn ectx() -> EventContext {
        EventContext::new(1, 1, 1, 1, Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
    }

    #[test]
    fn test_raw_ids_replaced_and_references_follow() {
        let ctx = TestCtx::new(&schemas());
        let mut bld = EventBuilder::new(&ctx, sys::qname_cud(), ectx()).unwrap();
        let dept = bld.create(&QName::new("app", "dept"), RecordId::raw(1)).unwrap();
        dept.row_mut().set_string("name", "R&D");
        let person = bld.create(&QName::new("app", "person"), RecordId::raw(2)).unwrap();
        person.row_mut().set_string("name", "Alice");
        person.row_mut().set_record_id("dept", RecordId::raw(1));
        let member = bld.create(&QName::new("app", "member"), RecordId::raw(3)).unwrap();
        member.row_mut().set_string("name", "Alice in R&D");
        member.set_parent(RecordId::raw(1));
        member.set_container("members");
        let mut event = bld.build();
        assert!(event.is_valid());

        let mut generator = SeqGenerator::new();
        regenerate_event_ids(&mut event, &ctx, &mut generator).unwrap();

        let creates = event.cud().creates();
        let dept_id = creates[0].id();
        let person_id = creates[1].id();
        assert!(dept_id.as_u64() >= FIRST_STORAGE_ID);
        assert!(person_id.as_u64() >= FIRST_STORAGE_ID);
        assert_ne!(dept_id, person_id);
        // the reference was rewritten with the same table
        assert_eq!(creates[1].row().as_record_id("dept"), dept_id);
        // the parent link followed the same substitution
        assert_eq!(creates[2].parent(), dept_id);
    }

    #[test]
    fn test_singleton_resolves_through_cache_not_generator() {
        let ctx = TestCtx::new(&schemas());
        let expected = ctx.singletons.id_for(&QName::new("app", "settings")).unwrap();

        let mut bld = EventBuilder::new(&ctx, sys::qname_cud(), ectx()).unwrap();
        bld.create(&QName::new("app", "settings"), RecordId::raw(1)).unwrap();
        let mut event = bld.build();

        let mut generator = SeqGenerator::new();
        regenerate_event_ids(&mut event, &ctx, &mut generator).unwrap();
        assert_eq!(event.cud().creates()[0].id(), expected);
        // the generator was never asked
        assert_eq!(generator.next, 0);
    }

    #[test]
    fn test_non_raw_id_in_new_event_is_an_error() {
        let ctx = TestCtx::new(&schemas());
        let mut bld = EventBuilder::new(&ctx, sys::qname_cud(), ectx()).unwrap();
        let dept = bld
            .create(&QName::new("app", "dept"), RecordId::from_parts(9, 9))
            .unwrap();
        dept.row_mut().set_string("name", "Pre-assigned");
        let mut event = bld.build();

        let mut generator = SeqGenerator::new();
        let err = regenerate_event_ids(&mut event, &ctx, &mut generator).unwrap_err();
        assert!(matches!(err, RegenError::NonRawId { .. }));
    }

    #[test]
    fn test_synced_event_accepts_resolved_ids_and_reports_them() {
        let ctx = TestCtx::new(&schemas());
        let synced_ctx = ectx().with_sync(
            Uuid::from_u128(7),
            Utc.timestamp_millis_opt(1_700_000_001_000).unwrap(),
        );
        let mut bld = EventBuilder::new(&ctx, sys::qname_cud(), synced_ctx).unwrap();
        let id = RecordId::from_parts(3, 1);
        let dept = bld.create(&QName::new("app", "dept"), id).unwrap();
        dept.row_mut().set_string("name", "Synced");
        let mut event = bld.build();

        let mut generator = SeqGenerator::new();
        regenerate_event_ids(&mut event, &ctx, &mut generator).unwrap();
        assert_eq!(generator.synced, vec![id]);
        assert_eq!(event.cud().creates()[0].id(), id);
    }

    #[test]
    fn test_second_regeneration_is_rejected_or_noop() {
        let ctx = TestCtx::new(&schemas());

        // new event: the second pass sees storage ids and rejects
        let mut bld = EventBuilder::new(&ctx, sys::qname_cud(), ectx()).unwrap();
        let dept = bld.create(&QName::new("app", "dept"), RecordId::raw(1)).unwrap();
        dept.row_mut().set_string("name", "Once");
        let mut event = bld.build();
        let mut generator = SeqGenerator::new();
        regenerate_event_ids(&mut event, &ctx, &mut generator).unwrap();
        let err = regenerate_event_ids(&mut event, &ctx, &mut generator).unwrap_err();
        assert!(matches!(err, RegenError::NonRawId { .. }));

        // synced event: the second pass is a no-op
        let synced_ctx = ectx().with_sync(
            Uuid::from_u128(8),
            Utc.timestamp_millis_opt(1_700_000_002_000).unwrap(),
        );
        let mut bld = EventBuilder::new(&ctx, sys::qname_cud(), synced_ctx).unwrap();
        let id = RecordId::from_parts(2, 2);
        let dept = bld.create(&QName::new("app", "dept"), id).unwrap();
        dept.row_mut().set_string("name", "Twice");
        let mut event = bld.build();
        let mut generator = SeqGenerator::new();
        regenerate_event_ids(&mut event, &ctx, &mut generator).unwrap();
        let before = event.cud().creates()[0].clone();
        regenerate_event_ids(&mut event, &ctx, &mut generator).unwrap();
        assert_eq!(event.cud().creates()[0], before);
    }

    #[test]
    fn test_unresolved_raw_reference_fails() {
        let ctx = TestCtx::new(&schemas());
        let mut bld = EventBuilder::new(&ctx, sys::qname_cud(), ectx()).unwrap();
        let person = bld.create(&QName::new("app", "person"), RecordId::raw(1)).unwrap();
        person.row_mut().set_string("name", "Dangling");
        person.row_mut().set_record_id("dept", RecordId::raw(55));
        let mut event = bld.build();

        let mut generator = SeqGenerator::new();
        let err = regenerate_event_ids(&mut event, &ctx, &mut generator).unwrap_err();
        assert!(matches!(err, RegenError::UnknownRawReference(_)));
    }
}
