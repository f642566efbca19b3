//! Shared test context: a prepared-configuration stand-in small enough for
//! unit tests across the codec, record and event modules.

use std::sync::Arc;

use crate::names::{ContainerCache, NamesResult, QName, QNameCache, SingletonCache};
use crate::record::RecordId;
use crate::schema::{CommandDef, SchemaError, SchemaResult, Schemas, TypeKind};
use crate::tokens::TokenVerifier;

use super::layout::LayoutCache;
use super::{AppContext, RowLayout};

/// Minimal [`AppContext`]: a schema plus freshly allocated identifiers
pub(crate) struct TestCtx {
    pub(crate) schemas: Schemas,
    pub(crate) qnames: QNameCache,
    pub(crate) containers: ContainerCache,
    pub(crate) singletons: SingletonCache,
    pub(crate) layouts: LayoutCache,
    pub(crate) verifier: Option<Arc<dyn TokenVerifier>>,
}

impl TestCtx {
    pub(crate) fn new(schemas: &Schemas) -> Self {
        let qnames = QNameCache::new();
        let containers = ContainerCache::new();
        let singletons = SingletonCache::new();
        let layouts = LayoutCache::new();
        for def in schemas.types() {
            qnames.allocate_if_absent(&def.qname).unwrap();
            for c in &def.containers {
                containers.allocate_if_absent(&c.name).unwrap();
            }
            if def.singleton && def.kind == TypeKind::Doc {
                singletons.allocate_if_absent(&def.qname).unwrap();
            }
        }
        for cmd in schemas.commands() {
            qnames.allocate_if_absent(&cmd.name).unwrap();
        }
        layouts.compile_all(schemas).unwrap();
        Self {
            schemas: schemas.clone(),
            qnames,
            containers,
            singletons,
            layouts,
            verifier: None,
        }
    }

    pub(crate) fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub(crate) fn new_row(&self, name: &QName) -> super::Row {
        let mut row = super::Row::new(self.layouts.get(name).unwrap());
        if let Some(v) = &self.verifier {
            row = row.with_verifier(Arc::clone(v));
        }
        row
    }
}

impl AppContext for TestCtx {
    fn qname_id(&self, name: &QName) -> NamesResult<u16> {
        self.qnames.id_for(name)
    }

    fn qname_by_id(&self, id: u16) -> NamesResult<QName> {
        self.qnames.name_for(id)
    }

    fn container_id(&self, name: &str) -> NamesResult<u16> {
        self.containers.id_for(name)
    }

    fn container_by_id(&self, id: u16) -> NamesResult<String> {
        self.containers.name_for(id)
    }

    fn layout(&self, qname: &QName) -> SchemaResult<Arc<RowLayout>> {
        self.layouts
            .get(qname)
            .ok_or_else(|| SchemaError::unknown_type(qname))
    }

    fn verifier(&self) -> Option<Arc<dyn TokenVerifier>> {
        self.verifier.clone()
    }

    fn command_def(&self, name: &QName) -> Option<CommandDef> {
        self.schemas.command(name)
    }

    fn singleton_id(&self, qname: &QName) -> NamesResult<RecordId> {
        self.singletons.id_for(qname)
    }
}
