//! Event and CUD subsystem for emberdb
//!
//! Composes argument objects, unlogged argument objects and create/update
//! operation sets into one serializable unit with a deferred, aggregated
//! build. Lifecycle:
//!
//! ```text
//! building -> built-and-valid | built-with-error -> serialized
//! ```
//!
//! Terminal once serialized; reloading from bytes re-enters one of the two
//! built states. An event that failed to build or decode keeps its error
//! and its original bytes, it is never silently dropped.

mod builder;
mod codec;
mod context;
mod cud;
mod errors;
#[allow(clippy::module_inception)]
mod event;

pub use builder::EventBuilder;
pub use codec::EVENT_CODEC_VERSION_CURRENT;
pub(crate) use codec::{decode_event_body, encode_event_body};
pub use context::{EventContext, SyncData};
pub use cud::{CudSet, CudUpdate};
pub use errors::{EventError, EventResult};
pub use event::{Event, EventFailure};

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::names::{sys, QName};
    use crate::pool::BufferPool;
    use crate::record::{ElementTree, RecordId};
    use crate::row::testctx::TestCtx;
    use crate::schema::{
        CommandDef, ContainerDef, DataKind, FieldDef, Occurs, Schemas, TypeDef, TypeKind,
    };

    use super::*;

    fn schemas() -> Schemas {
        let mut schemas = Schemas::new();
        schemas
            .add_type(
                TypeDef::new(QName::new("app", "orderArg"), TypeKind::Object)
                    .with_field(FieldDef::required("number", DataKind::Int64))
                    .with_container(ContainerDef::new(
                        "lines",
                        QName::new("app", "lineElem"),
                        0,
                        Occurs::Unbounded,
                    )),
            )
            .unwrap();
        schemas
            .add_type(
                TypeDef::new(QName::new("app", "lineElem"), TypeKind::Element)
                    .with_field(FieldDef::required("qty", DataKind::Int32)),
            )
            .unwrap();
        schemas
            .add_type(
                TypeDef::new(QName::new("app", "secretArg"), TypeKind::Object)
                    .with_field(FieldDef::optional("password", DataKind::String)),
            )
            .unwrap();
        schemas
            .add_type(
                TypeDef::new(QName::new("app", "doc"), TypeKind::Doc)
                    .with_field(FieldDef::required("title", DataKind::String)),
            )
            .unwrap();
        schemas
            .add_command(
                CommandDef::new(QName::new("app", "makeOrder"))
                    .with_arg(QName::new("app", "orderArg"))
                    .with_unlogged_arg(QName::new("app", "secretArg")),
            )
            .unwrap();
        schemas
    }

    fn context() -> EventContext {
        EventContext::new(
            1,
            10,
            7000,
            3,
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        )
    }

    fn build_event(ctx: &TestCtx) -> Event {
        let mut bld = EventBuilder::new(ctx, QName::new("app", "makeOrder"), context()).unwrap();
        {
            let tree = bld.argument().unwrap();
            tree.root_mut().row_mut().set_int64("number", 42);
        }
        let line = {
            let mut row = bld.new_row(&QName::new("app", "lineElem")).unwrap();
            row.set_int32("qty", 5);
            row
        };
        bld.argument()
            .unwrap()
            .add_child(ElementTree::ROOT, "lines", line);
        {
            let tree = bld.unlogged_argument().unwrap();
            tree.root_mut().row_mut().set_string("password", "hunter2");
        }
        let create = bld.create(&QName::new("app", "doc"), RecordId::raw(1)).unwrap();
        create.row_mut().set_string("title", "created");
        bld.build()
    }

    #[test]
    fn test_build_valid_event() {
        let ctx = TestCtx::new(&schemas());
        let event = build_event(&ctx);
        assert!(event.is_valid());
        assert_eq!(event.qname(), QName::new("app", "makeOrder"));
        assert_eq!(event.cud().creates().len(), 1);
    }

    #[test]
    fn test_unknown_command_rejected() {
        let ctx = TestCtx::new(&schemas());
        let err = EventBuilder::new(&ctx, QName::new("app", "ghost"), context()).unwrap_err();
        assert!(matches!(err, EventError::UnknownCommand(_)));
    }

    #[test]
    fn test_cud_only_command_has_no_argument() {
        let ctx = TestCtx::new(&schemas());
        let mut bld = EventBuilder::new(&ctx, sys::qname_cud(), context()).unwrap();
        let err = bld.argument().unwrap_err();
        assert!(matches!(err, EventError::NoArgumentDeclared { .. }));
    }

    #[test]
    fn test_build_with_error_keeps_event() {
        let ctx = TestCtx::new(&schemas());
        let mut bld = EventBuilder::new(&ctx, QName::new("app", "makeOrder"), context()).unwrap();
        // required "number" left unset, plus one unknown field
        bld.argument()
            .unwrap()
            .root_mut()
            .row_mut()
            .set_int32("ghost", 1);
        let event = bld.build();

        assert!(!event.is_valid());
        assert_eq!(event.qname(), sys::qname_error());
        assert_eq!(*event.name(), QName::new("app", "makeOrder"));
        let failure = event.error().unwrap();
        assert!(failure.message.contains("'number'"));
        assert!(failure.message.contains("'ghost'"));
    }

    #[test]
    fn test_store_load_roundtrip() {
        let ctx = TestCtx::new(&schemas());
        let pool = BufferPool::new();
        let mut event = build_event(&ctx);
        let bytes = event.store(&ctx, &pool).unwrap().to_vec();

        let loaded = Event::load(&bytes, &ctx, &pool);
        assert!(loaded.is_valid());
        assert_eq!(*loaded.name(), QName::new("app", "makeOrder"));
        assert_eq!(loaded.context(), event.context());

        let arg = loaded.argument().unwrap();
        assert_eq!(arg.root().row().as_int64("number"), 42);
        assert_eq!(arg.child_count_in(ElementTree::ROOT, "lines"), 1);

        // the unlogged argument never survives serialization
        assert!(loaded.unlogged_argument().is_none());

        assert_eq!(loaded.cud().creates().len(), 1);
        assert_eq!(loaded.cud().creates()[0].row().as_string("title"), "created");
        assert_eq!(loaded.raw_bytes(), Some(bytes.as_slice()));
    }

    #[test]
    fn test_load_garbage_preserves_bytes_and_error() {
        let ctx = TestCtx::new(&schemas());
        let pool = BufferPool::new();
        let garbage = vec![0xFF, 0x01, 0x02, 0x03];
        let event = Event::load(&garbage, &ctx, &pool);

        assert!(!event.is_valid());
        assert_eq!(event.qname(), sys::qname_error());
        let failure = event.error().unwrap();
        assert_eq!(failure.original_bytes.as_deref(), Some(garbage.as_slice()));
        assert_eq!(event.raw_bytes(), Some(garbage.as_slice()));
    }

    #[test]
    fn test_error_event_roundtrips_through_storage() {
        let ctx = TestCtx::new(&schemas());
        let pool = BufferPool::new();
        let mut bld = EventBuilder::new(&ctx, QName::new("app", "makeOrder"), context()).unwrap();
        bld.argument().unwrap(); // required "number" missing
        let mut event = bld.build();
        assert!(!event.is_valid());

        let bytes = event.store(&ctx, &pool).unwrap().to_vec();
        let loaded = Event::load(&bytes, &ctx, &pool);
        assert!(!loaded.is_valid());
        assert_eq!(loaded.qname(), sys::qname_error());
        assert_eq!(*loaded.name(), QName::new("app", "makeOrder"));
        assert!(loaded.error().unwrap().message.contains("'number'"));
    }

    #[test]
    fn test_redact_masks_payload() {
        let ctx = TestCtx::new(&schemas());
        let mut event = build_event(&ctx);
        event.redact();

        let arg = event.argument().unwrap();
        assert_eq!(arg.root().row().as_int64("number"), 0);
        assert_eq!(
            event.cud().creates()[0].row().as_string("title"),
            crate::row::MASKED_STRING
        );
        // identity survives redaction
        assert_eq!(event.cud().creates()[0].id(), RecordId::raw(1));
    }

    #[test]
    fn test_release_returns_buffer_to_pool() {
        let ctx = TestCtx::new(&schemas());
        let pool = BufferPool::new();
        let mut event = build_event(&ctx);
        event.store(&ctx, &pool).unwrap();
        assert_eq!(pool.spare_count(), 0);
        event.release();
        assert!(event.raw_bytes().is_none());
        assert_eq!(pool.spare_count(), 1);
    }
}
