//! Identifier cache error types
//!
//! Error codes:
//! - EMBER_NAMES_NOT_FOUND (REJECT)
//! - EMBER_NAMES_UNKNOWN_VERSION (FATAL)
//! - EMBER_NAMES_IDS_EXCEEDED (FATAL)
//! - EMBER_NAMES_RENAME_REJECTED (REJECT)
//!
//! Not-found lookups are always distinguishable from systemic failures so
//! callers can decide whether to allocate or abort.

use std::fmt;

use crate::storage::StorageError;

/// Severity levels for identifier cache errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Request rejected, the application continues
    Reject,
    /// Configuration error, the application must abort startup
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Identifier cache error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamesErrorCode {
    /// Name or identifier is not in the table
    EmberNamesNotFound,
    /// Stored table uses a version this build does not understand
    EmberNamesUnknownVersion,
    /// The 16-bit identifier space is exhausted
    EmberNamesIdsExceeded,
    /// Rename preconditions not met
    EmberNamesRenameRejected,
    /// Underlying storage failed
    EmberNamesStorage,
}

impl NamesErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            NamesErrorCode::EmberNamesNotFound => "EMBER_NAMES_NOT_FOUND",
            NamesErrorCode::EmberNamesUnknownVersion => "EMBER_NAMES_UNKNOWN_VERSION",
            NamesErrorCode::EmberNamesIdsExceeded => "EMBER_NAMES_IDS_EXCEEDED",
            NamesErrorCode::EmberNamesRenameRejected => "EMBER_NAMES_RENAME_REJECTED",
            NamesErrorCode::EmberNamesStorage => "EMBER_NAMES_STORAGE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            NamesErrorCode::EmberNamesNotFound | NamesErrorCode::EmberNamesRenameRejected => {
                Severity::Reject
            }
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for NamesErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Identifier cache error with context
#[derive(Debug)]
pub struct NamesError {
    code: NamesErrorCode,
    message: String,
    source: Option<StorageError>,
}

impl NamesError {
    /// Unknown name lookup
    pub fn name_not_found(name: impl fmt::Display) -> Self {
        Self {
            code: NamesErrorCode::EmberNamesNotFound,
            message: format!("name '{}' not found", name),
            source: None,
        }
    }

    /// Unknown identifier lookup
    pub fn id_not_found(id: u64) -> Self {
        Self {
            code: NamesErrorCode::EmberNamesNotFound,
            message: format!("identifier {} not found", id),
            source: None,
        }
    }

    /// Stored view version is newer than this build supports
    pub fn unknown_version(view: u16, version: u16, latest: u16) -> Self {
        Self {
            code: NamesErrorCode::EmberNamesUnknownVersion,
            message: format!(
                "system view {} stored at version {}, latest supported is {}",
                view, version, latest
            ),
            source: None,
        }
    }

    /// Identifier space exhausted
    pub fn ids_exceeded(view: u16) -> Self {
        Self {
            code: NamesErrorCode::EmberNamesIdsExceeded,
            message: format!("system view {}: identifiers exceeded", view),
            source: None,
        }
    }

    /// Rename precondition failure
    pub fn rename_rejected(message: impl Into<String>) -> Self {
        Self {
            code: NamesErrorCode::EmberNamesRenameRejected,
            message: message.into(),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> NamesErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for a plain not-found lookup
    pub fn is_not_found(&self) -> bool {
        self.code == NamesErrorCode::EmberNamesNotFound
    }

    /// Returns whether this is a fatal configuration error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for NamesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for NamesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<StorageError> for NamesError {
    fn from(e: StorageError) -> Self {
        Self {
            code: NamesErrorCode::EmberNamesStorage,
            message: e.message().to_string(),
            source: Some(e),
        }
    }
}

/// Result type for identifier cache operations
pub type NamesResult<T> = Result<T, NamesError>;
