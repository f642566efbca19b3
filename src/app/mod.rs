//! Application configuration for emberdb
//!
//! [`AppConfig`] owns everything the engine compiles out of a declared
//! schema: the three identifier caches, the per-type row layouts, the
//! validators, the token verifier and the buffer pool. It lives for the
//! application's lifetime and is the [`AppContext`] every codec consumes.
//!
//! Preparation is a one-shot, gated phase: the first `prepare()` call
//! loads the persisted identifier tables, registers every declared name
//! and flushes new allocations back in one batch per table; a concurrent
//! or repeated call observes "already prepared" and returns immediately.
//! After preparation, identifier lookups take read locks only.

mod errors;

use std::sync::{Mutex, OnceLock};
use std::sync::Arc;

use crate::event::{Event, EventBuilder, EventContext};
use crate::names::{ContainerCache, ContainerId, NamesResult, QName, QNameCache, QNameId, SingletonCache};
use crate::observability::Logger;
use crate::pool::BufferPool;
use crate::record::{Record, RecordId};
use crate::row::{AppContext, Row, RowLayout};
use crate::schema::{CommandDef, SchemaError, SchemaResult, Schemas, TypeKind};
use crate::storage::{KvStore, VersionsView};
use crate::tokens::TokenVerifier;
use crate::validate::Validators;

pub use errors::{AppError, AppResult};

/// The prepared application configuration
pub struct AppConfig {
    schemas: Schemas,
    qnames: QNameCache,
    containers: ContainerCache,
    singletons: SingletonCache,
    layouts: crate::row::LayoutCache,
    validators: OnceLock<Validators>,
    verifier: Option<Arc<dyn TokenVerifier>>,
    pool: BufferPool,
    prepared: Mutex<bool>,
}

impl AppConfig {
    /// Create a configuration over a declared schema.
    ///
    /// The schema's structural checks run here; an invalid schema never
    /// produces a configuration.
    pub fn new(schemas: Schemas) -> AppResult<Self> {
        schemas.validate_structure()?;
        Ok(Self {
            schemas,
            qnames: QNameCache::new(),
            containers: ContainerCache::new(),
            singletons: SingletonCache::new(),
            layouts: crate::row::LayoutCache::new(),
            validators: OnceLock::new(),
            verifier: None,
            pool: BufferPool::new(),
            prepared: Mutex::new(false),
        })
    }

    /// Attach the token verifier consulted by verifiable fields
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// The declared schema
    pub fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    /// The shared serialization buffer pool
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Returns true once `prepare` has completed
    pub fn is_prepared(&self) -> bool {
        *self.lock_prepared()
    }

    /// Load persisted identifier tables, register every declared name,
    /// compile layouts and validators, and flush new allocations.
    ///
    /// Idempotent: a second call observes "already prepared" and returns.
    pub fn prepare(&self, storage: &mut dyn KvStore) -> AppResult<()> {
        let mut guard = self.lock_prepared();
        if *guard {
            return Ok(());
        }

        let mut versions = VersionsView::new();
        versions.load(storage)?;
        self.qnames.load(storage, &versions)?;
        self.containers.load(storage, &versions)?;
        self.singletons.load(storage, &versions)?;

        for def in self.schemas.types() {
            self.qnames.allocate_if_absent(&def.qname)?;
            for container in &def.containers {
                self.containers.allocate_if_absent(&container.name)?;
            }
            if def.singleton && def.kind == TypeKind::Doc {
                self.singletons.allocate_if_absent(&def.qname)?;
            }
        }
        for command in self.schemas.commands() {
            self.qnames.allocate_if_absent(&command.name)?;
        }

        self.layouts.compile_all(&self.schemas)?;
        let _ = self.validators.set(Validators::build(&self.schemas));

        let flushed_qnames = self.qnames.flush(storage, &mut versions)?;
        let flushed_containers = self.containers.flush(storage, &mut versions)?;
        let flushed_singletons = self.singletons.flush(storage, &mut versions)?;

        Logger::info(
            "APP_PREPARED",
            &[
                ("types", &self.schemas.type_count().to_string()),
                ("qnames_flushed", &flushed_qnames.to_string()),
                ("containers_flushed", &flushed_containers.to_string()),
                ("singletons_flushed", &flushed_singletons.to_string()),
            ],
        );

        *guard = true;
        Ok(())
    }

    /// Re-bind a type's identifier to a new name and persist the change.
    ///
    /// The numeric identifier is preserved, so stored rows referencing it
    /// stay valid without rewriting data.
    pub fn rename_qname(
        &self,
        storage: &mut dyn KvStore,
        old: &QName,
        new: &QName,
    ) -> AppResult<()> {
        let mut versions = VersionsView::new();
        versions.load(storage)?;
        self.qnames.rename(old, new)?;
        self.qnames.flush(storage, &mut versions)?;
        Logger::info(
            "QNAME_RENAMED",
            &[("old", &old.to_string()), ("new", &new.to_string())],
        );
        Ok(())
    }

    /// A fresh row of a declared type, wired to the configured verifier
    pub fn new_row(&self, qname: &QName) -> AppResult<Row> {
        let layout = self.layout(qname)?;
        let mut row = Row::new(layout);
        if let Some(verifier) = &self.verifier {
            row = row.with_verifier(Arc::clone(verifier));
        }
        Ok(row)
    }

    /// A fresh record of a declared document or record type
    pub fn new_record(&self, qname: &QName) -> AppResult<Record> {
        Ok(Record::new(self.new_row(qname)?))
    }

    /// Start building an event for a registered command
    pub fn new_event(&self, name: QName, context: EventContext) -> AppResult<EventBuilder<'_>> {
        Ok(EventBuilder::new(self, name, context)?)
    }

    /// Reconstruct an event from stored bytes and run post-decode
    /// validation. Never fails: a decode or validation problem leaves the
    /// event in the built-with-error state with its bytes preserved.
    pub fn load_event(&self, bytes: &[u8]) -> Event {
        let mut event = Event::load(bytes, self, &self.pool);
        if event.is_valid() {
            if let Some(validators) = self.validators.get() {
                if let Err(e) = validators.validate_event(&event) {
                    event.mark_failed(e.to_string());
                }
            }
        }
        event
    }

    /// Validate a built event against the schema
    pub fn validate_event(&self, event: &Event) -> AppResult<()> {
        let validators = self.validators.get().ok_or(AppError::NotPrepared)?;
        validators.validate_event(event)?;
        Ok(())
    }

    fn lock_prepared(&self) -> std::sync::MutexGuard<'_, bool> {
        match self.prepared.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AppContext for AppConfig {
    fn qname_id(&self, name: &QName) -> NamesResult<QNameId> {
        self.qnames.id_for(name)
    }

    fn qname_by_id(&self, id: QNameId) -> NamesResult<QName> {
        self.qnames.name_for(id)
    }

    fn container_id(&self, name: &str) -> NamesResult<ContainerId> {
        self.containers.id_for(name)
    }

    fn container_by_id(&self, id: ContainerId) -> NamesResult<String> {
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
