//! Application configuration error type

use thiserror::Error;

use crate::event::EventError;
use crate::names::NamesError;
use crate::row::RowError;
use crate::schema::SchemaError;
use crate::storage::StorageError;
use crate::validate::ValidateErrors;

/// Any application-configuration failure
#[derive(Debug, Error)]
pub enum AppError {
    /// Declared schema problem
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Identifier cache failure
    #[error(transparent)]
    Names(#[from] NamesError),

    /// Storage collaborator failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Row codec failure
    #[error(transparent)]
    Row(#[from] RowError),

    /// Event model failure
    #[error(transparent)]
    Event(#[from] EventError),

    /// Aggregated validation failure
    #[error(transparent)]
    Validate(#[from] ValidateErrors),

    /// Operation needs a prepared configuration
    #[error("application configuration is not prepared")]
    NotPrepared,
}

/// Result type for application configuration operations
pub type AppResult<T> = Result<T, AppError>;
