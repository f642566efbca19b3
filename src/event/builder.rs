//! Event builder
//!
//! Builds an event in place: the name is fixed at construction, the
//! expected argument types come from the registered command, and every
//! problem found while composing is deferred. `build()` never throws a
//! half-built event away; it returns the event in either the
//! built-and-valid or the built-with-error state.

use crate::names::QName;
use crate::record::{ElementTree, Record, RecordId};
use crate::row::{AppContext, BuildErrors, Row, RowError};
use crate::schema::CommandDef;

use super::context::EventContext;
use super::cud::CudSet;
use super::errors::{EventError, EventResult};
use super::event::{Event, EventFailure};

/// Composes one event against a prepared configuration
pub struct EventBuilder<'a> {
    ctx: &'a dyn AppContext,
    name: QName,
    command: CommandDef,
    context: EventContext,
    argument: Option<ElementTree>,
    unlogged: Option<ElementTree>,
    cud: CudSet,
}

impl std::fmt::Debug for EventBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuilder")
            .field("name", &self.name)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<'a> EventBuilder<'a> {
    /// Start building an event for a registered command.
    ///
    /// The name is fixed here; the expected argument and unlogged-argument
    /// types come from the command definition. The built-in `sys.CUD`
    /// command declares no argument objects.
    pub fn new(ctx: &'a dyn AppContext, name: QName, context: EventContext) -> EventResult<Self> {
        let command = ctx
            .command_def(&name)
            .ok_or_else(|| EventError::UnknownCommand(name.clone()))?;
        Ok(Self {
            ctx,
            name,
            command,
            context,
            argument: None,
            unlogged: None,
            cud: CudSet::new(),
        })
    }

    /// The event's name
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// The argument tree, created on first access with the command's
    /// declared argument type as its root
    pub fn argument(&mut self) -> EventResult<&mut ElementTree> {
        let tree = match self.argument.take() {
            Some(tree) => tree,
            None => {
                let qname = self.command.arg.clone().ok_or_else(|| {
                    EventError::NoArgumentDeclared {
                        command: self.name.clone(),
                        which: "an argument object",
                    }
                })?;
                ElementTree::new(self.new_row(&qname)?)
            }
        };
        Ok(self.argument.insert(tree))
    }

    /// The unlogged argument tree, created on first access
    pub fn unlogged_argument(&mut self) -> EventResult<&mut ElementTree> {
        let tree = match self.unlogged.take() {
            Some(tree) => tree,
            None => {
                let qname = self.command.unlogged_arg.clone().ok_or_else(|| {
                    EventError::NoArgumentDeclared {
                        command: self.name.clone(),
                        which: "an unlogged argument object",
                    }
                })?;
                ElementTree::new(self.new_row(&qname)?)
            }
        };
        Ok(self.unlogged.insert(tree))
    }

    /// A fresh row of a declared type, wired to the configured verifier
    pub fn new_row(&self, qname: &QName) -> EventResult<Row> {
        let layout = self.ctx.layout(qname).map_err(RowError::from)?;
        let mut row = Row::new(layout);
        if let Some(verifier) = self.ctx.verifier() {
            row = row.with_verifier(verifier);
        }
        Ok(row)
    }

    /// Add a create operation for a fresh, raw-identified record
    pub fn create(&mut self, qname: &QName, id: RecordId) -> EventResult<&mut Record> {
        let mut row = self.new_row(qname)?;
        row.set_id(id);
        self.cud.add_create(Record::new(row))
    }

    /// Add an update of an existing record; returns the delta row
    pub fn update(&mut self, original: &Record) -> EventResult<&mut Row> {
        self.cud.add_update(original.clone())
    }

    /// The CUD set under construction
    pub fn cud(&mut self) -> &mut CudSet {
        &mut self.cud
    }

    /// Finish building.
    ///
    /// Recursively builds the argument tree, the unlogged tree and every
    /// CUD row, joining all problems. The returned event is
    /// built-and-valid when nothing went wrong, built-with-error
    /// otherwise; it is never discarded. Schema-shape validation is the
    /// validation engine's job, invoked afterwards.
    pub fn build(mut self) -> Event {
        let mut errs = BuildErrors::new();
        if let Some(tree) = &self.argument {
            if let Err(e) = tree.build() {
                errs.merge(e);
            }
        }
        if let Some(tree) = &self.unlogged {
            if let Err(e) = tree.build() {
                errs.merge(e);
            }
        }
        if let Err(e) = self.cud.build() {
            errs.merge(e);
        }

        let mut failure: Option<String> = if errs.is_empty() {
            None
        } else {
            Some(errs.to_string())
        };
        if failure.is_none() {
            if let Err(e) = self.cud.apply() {
                failure = Some(e.to_string());
            }
        }

        let error = failure.map(|message| EventFailure {
            message,
            original_name: self.name.clone(),
            original_bytes: None,
        });
        Event::assembled(
            self.name,
            self.context,
            self.argument,
            self.unlogged,
            self.cud,
            error,
        )
    }
}
