//! Schema registry error types
//!
//! Error codes:
//! - EMBER_SCHEMA_UNKNOWN_TYPE (REJECT)
//! - EMBER_SCHEMA_UNKNOWN_COMMAND (REJECT)
//! - EMBER_SCHEMA_DUPLICATE (REJECT)
//! - EMBER_SCHEMA_INVALID (FATAL, preparation aborts)

use std::fmt;

use crate::names::QName;

/// Severity levels for schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Request rejected
    Reject,
    /// The application must abort startup
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

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// QName not declared in the schema
    EmberSchemaUnknownType,
    /// Command not registered
    EmberSchemaUnknownCommand,
    /// Type or command declared twice
    EmberSchemaDuplicate,
    /// Declared schema fails its own structural checks
    EmberSchemaInvalid,
}

impl SchemaErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::EmberSchemaUnknownType => "EMBER_SCHEMA_UNKNOWN_TYPE",
            SchemaErrorCode::EmberSchemaUnknownCommand => "EMBER_SCHEMA_UNKNOWN_COMMAND",
            SchemaErrorCode::EmberSchemaDuplicate => "EMBER_SCHEMA_DUPLICATE",
            SchemaErrorCode::EmberSchemaInvalid => "EMBER_SCHEMA_INVALID",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            SchemaErrorCode::EmberSchemaInvalid => Severity::Fatal,
            _ => Severity::Reject,
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error with context
#[derive(Debug)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
}

impl SchemaError {
    /// Unknown type lookup
    pub fn unknown_type(name: &QName) -> Self {
        Self {
            code: SchemaErrorCode::EmberSchemaUnknownType,
            message: format!("type '{}' is not declared", name),
        }
    }

    /// Unknown command lookup
    pub fn unknown_command(name: &QName) -> Self {
        Self {
            code: SchemaErrorCode::EmberSchemaUnknownCommand,
            message: format!("command '{}' is not registered", name),
        }
    }

    /// Duplicate declaration
    pub fn duplicate(name: &QName) -> Self {
        Self {
            code: SchemaErrorCode::EmberSchemaDuplicate,
            message: format!("'{}' is declared twice", name),
        }
    }

    /// Structural problem in the declared schema
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: SchemaErrorCode::EmberSchemaInvalid,
            message: message.into(),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
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

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let name = QName::new("app", "ghost");
        assert_eq!(
            SchemaError::unknown_type(&name).code().code(),
            "EMBER_SCHEMA_UNKNOWN_TYPE"
        );
        assert_eq!(
            SchemaError::duplicate(&name).code().code(),
            "EMBER_SCHEMA_DUPLICATE"
        );
    }

    #[test]
    fn test_invalid_is_fatal() {
        assert!(SchemaError::invalid("bad").is_fatal());
        assert!(!SchemaError::unknown_type(&QName::new("a", "b")).is_fatal());
    }
}
