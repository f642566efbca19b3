//! Storage collaborator error types
//!
//! Error codes:
//! - EMBER_STORAGE_IO_ERROR (ERROR severity)
//! - EMBER_STORAGE_WRITE_FAILED (ERROR severity)
//! - EMBER_STORAGE_READ_FAILED (ERROR severity)
//! - EMBER_DATA_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, caller continues
    Error,
    /// The application must abort startup
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Backend I/O failure
    EmberStorageIoError,
    /// Batched put failed
    EmberStorageWriteFailed,
    /// Point or range read failed
    EmberStorageReadFailed,
    /// Stored cell failed integrity checks
    EmberDataCorruption,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::EmberStorageIoError => "EMBER_STORAGE_IO_ERROR",
            StorageErrorCode::EmberStorageWriteFailed => "EMBER_STORAGE_WRITE_FAILED",
            StorageErrorCode::EmberStorageReadFailed => "EMBER_STORAGE_READ_FAILED",
            StorageErrorCode::EmberDataCorruption => "EMBER_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::EmberDataCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with full context
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl StorageError {
    /// Create an I/O error
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::EmberStorageIoError,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a write failure
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::EmberStorageWriteFailed,
            message: message.into(),
            source: None,
        }
    }

    /// Create a read failure
    pub fn read_failed(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::EmberStorageReadFailed,
            message: message.into(),
            source: None,
        }
    }

    /// Create a corruption error (FATAL)
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::EmberDataCorruption,
            message: message.into(),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
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

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
