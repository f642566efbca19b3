//! The event: one serializable unit of change
//!
//! An event carries its command name, its position in the partition and
//! workspace logs, an argument element tree, an unlogged argument tree and
//! a CUD set. It is built once, validated, then immutably serialized.
//!
//! An event never disappears because something went wrong: a build problem
//! or a failed decode produces an event in the built-with-error state, with
//! the error message and the original bytes preserved for diagnostics.

use crate::names::{sys, QName};
use crate::pool::{BufferPool, PooledBuf};
use crate::record::ElementTree;
use crate::row::AppContext;

use super::codec;
use super::context::EventContext;
use super::cud::CudSet;
use super::errors::EventResult;

/// Why an event is in the built-with-error state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFailure {
    /// What went wrong, already aggregated
    pub message: String,
    /// The name the event was built for, before the error marker took over
    pub original_name: QName,
    /// The bytes the event failed to decode from, if any
    pub original_bytes: Option<Vec<u8>>,
}

/// One unit of change, serializable once built
#[derive(Debug)]
pub struct Event {
    name: QName,
    context: EventContext,
    argument: Option<ElementTree>,
    unlogged: Option<ElementTree>,
    cud: CudSet,
    error: Option<EventFailure>,
    raw: Option<PooledBuf>,
}

impl Event {
    /// Assemble an event from its parts (builder and codec internals)
    pub(crate) fn assembled(
        name: QName,
        context: EventContext,
        argument: Option<ElementTree>,
        unlogged: Option<ElementTree>,
        cud: CudSet,
        error: Option<EventFailure>,
    ) -> Self {
        Self {
            name,
            context,
            argument,
            unlogged,
            cud,
            error,
            raw: None,
        }
    }

    /// An event in the built-with-error state
    pub(crate) fn with_failure(context: EventContext, failure: EventFailure) -> Self {
        Self {
            name: failure.original_name.clone(),
            context,
            argument: None,
            unlogged: None,
            cud: CudSet::new(),
            error: Some(failure),
            raw: None,
        }
    }

    /// The effective type: the event's name, or the error marker for an
    /// event in the built-with-error state
    pub fn qname(&self) -> QName {
        if self.error.is_some() {
            sys::qname_error()
        } else {
            self.name.clone()
        }
    }

    /// The name the event was built for, error or not
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Position and time of the event
    pub fn context(&self) -> &EventContext {
        &self.context
    }

    /// The argument element tree, if the command declares one
    pub fn argument(&self) -> Option<&ElementTree> {
        self.argument.as_ref()
    }

    /// The argument element tree, mutably
    pub fn argument_mut(&mut self) -> Option<&mut ElementTree> {
        self.argument.as_mut()
    }

    /// The unlogged argument tree. Never part of the serialized bytes.
    pub fn unlogged_argument(&self) -> Option<&ElementTree> {
        self.unlogged.as_ref()
    }

    /// The unlogged argument tree, mutably
    pub fn unlogged_argument_mut(&mut self) -> Option<&mut ElementTree> {
        self.unlogged.as_mut()
    }

    /// The event's CUD set
    pub fn cud(&self) -> &CudSet {
        &self.cud
    }

    /// The event's CUD set, mutably
    pub fn cud_mut(&mut self) -> &mut CudSet {
        &mut self.cud
    }

    /// Returns true when the event built (or decoded) cleanly
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// The failure carried by a built-with-error event
    pub fn error(&self) -> Option<&EventFailure> {
        self.error.as_ref()
    }

    /// Move a decoded event into the built-with-error state after failed
    /// post-decode validation
    pub(crate) fn mark_failed(&mut self, message: String) {
        self.error = Some(EventFailure {
            message,
            original_name: self.name.clone(),
            original_bytes: None,
        });
    }

    /// Redact every user field value in the argument tree and the CUD set,
    /// leaving names, context and system fields readable
    pub fn redact(&mut self) {
        if let Some(tree) = &mut self.argument {
            tree.mask_values();
        }
        if let Some(tree) = &mut self.unlogged {
            tree.mask_values();
        }
        self.cud.mask_values();
    }

    /// Serialize the event into a pooled buffer and keep it.
    ///
    /// The unlogged argument tree is excluded. An event in the
    /// built-with-error state serializes its failure, original name and
    /// original bytes, so reloading it re-enters the same state.
    pub fn store<'a>(
        &'a mut self,
        ctx: &dyn AppContext,
        pool: &BufferPool,
    ) -> EventResult<&'a [u8]> {
        let mut buf = pool.get();
        codec::encode_event_into(self, ctx, &mut buf)?;
        Ok(self.raw.insert(buf).as_slice())
    }

    /// The serialized bytes, once stored or loaded
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.raw.as_ref().map(|b| b.as_slice())
    }

    /// Reconstruct an event from stored bytes.
    ///
    /// Never fails: undecodable bytes produce an event in the
    /// built-with-error state carrying the decode error and the original
    /// bytes. The bytes are retained in a pooled buffer either way.
    pub fn load(bytes: &[u8], ctx: &dyn AppContext, pool: &BufferPool) -> Event {
        let mut event = match codec::decode_event_body(bytes, ctx) {
            Ok(event) => event,
            Err(e) => Event::with_failure(
                EventContext::new(0, 0, 0, 0, chrono::DateTime::<chrono::Utc>::MIN_UTC),
                EventFailure {
                    message: e.to_string(),
                    original_name: QName::null(),
                    original_bytes: Some(bytes.to_vec()),
                },
            ),
        };
        event.raw = Some(PooledBuf::copied_from(pool, bytes));
        event
    }

    /// Release the serialized buffer back to the pool and drop every row's
    /// values, recursively through the whole element tree and CUD set
    pub fn release(&mut self) {
        self.raw = None;
        if let Some(tree) = &mut self.argument {
            tree.release();
        }
        if let Some(tree) = &mut self.unlogged {
            tree.release();
        }
        self.cud.release();
    }
}

impl Clone for Event {
    fn clone(&self) -> Self {
        // the retained buffer belongs to the pool; a clone starts without one
        Self {
            name: self.name.clone(),
            context: self.context.clone(),
            argument: self.argument.clone(),
            unlogged: self.unlogged.clone(),
            cud: self.cud.clone(),
            error: self.error.clone(),
            raw: None,
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        // the retained buffer is transport state, not identity
        self.name == other.name
            && self.context == other.context
            && self.argument == other.argument
            && self.unlogged == other.unlogged
            && self.cud == other.cud
            && self.error == other.error
    }
}
