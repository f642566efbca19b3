//! Event model error types

use thiserror::Error;

use crate::names::QName;
use crate::record::RecordId;
use crate::row::{BuildErrors, DecodeError, RowError};
use crate::storage::StorageError;

/// Event operation failures
#[derive(Debug, Error)]
pub enum EventError {
    /// Row-level failure while composing or encoding
    #[error(transparent)]
    Row(#[from] RowError),

    /// Aggregated build problems
    #[error(transparent)]
    Build(#[from] BuildErrors),

    /// Malformed binary input
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Storage failure during lazy update rehydration
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Event name is not a registered command
    #[error("command '{0}' is not registered")]
    UnknownCommand(QName),

    /// Command does not declare the requested argument object
    #[error("command '{command}' does not declare {which}")]
    NoArgumentDeclared {
        /// The command
        command: QName,
        /// Which argument was requested
        which: &'static str,
    },

    /// A second update targets the same record
    #[error("update for record {0} already present")]
    DuplicateUpdate(RecordId),

    /// Update cannot be applied without its original record
    #[error("update for record {0} has no original record")]
    MissingOriginal(RecordId),

    /// Create carries no identifier
    #[error("create of '{0}' carries a null record id")]
    NullCreateId(QName),
}

/// Result type for event operations
pub type EventResult<T> = Result<T, EventError>;
