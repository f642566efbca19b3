//! Row codec error types
//!
//! Two families with different propagation rules:
//!
//! - build problems (`FieldIssue`, `BuildErrors`) are collected while the
//!   caller fills a row and surfaced together by `build()`, never one at a
//!   time;
//! - decode problems (`DecodeError`) indicate storage or transport
//!   corruption and fail immediately, distinctly from validation.

use std::fmt;

use thiserror::Error;

use crate::names::{NamesError, QName};
use crate::schema::SchemaError;

/// One rejected field operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldIssue {
    /// Field is not declared, or a required field has no value
    #[error("field '{field}': name not found")]
    NameNotFound {
        /// Field name
        field: String,
    },

    /// Value kind does not match the declared data kind
    #[error("field '{field}': wrong type {actual}, expected {expected}")]
    WrongType {
        /// Field name
        field: String,
        /// Kind of the presented value
        actual: &'static str,
        /// Declared kind
        expected: &'static str,
    },

    /// Value violates a length or pattern restriction
    #[error("field '{field}': {detail}")]
    Restricted {
        /// Field name
        field: String,
        /// What was violated
        detail: String,
    },

    /// Verifiable field rejected its token
    #[error("field '{field}': token verification failed: {detail}")]
    VerificationFailed {
        /// Field name
        field: String,
        /// What went wrong
        detail: String,
    },
}

impl FieldIssue {
    /// The field the issue is about
    pub fn field(&self) -> &str {
        match self {
            FieldIssue::NameNotFound { field }
            | FieldIssue::WrongType { field, .. }
            | FieldIssue::Restricted { field, .. }
            | FieldIssue::VerificationFailed { field, .. } => field,
        }
    }
}

/// A field issue attributed to the type it occurred on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildIssue {
    /// Type the row belongs to
    pub qname: QName,
    /// The rejected operation
    pub issue: FieldIssue,
}

impl fmt::Display for BuildIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type '{}': {}", self.qname, self.issue)
    }
}

/// Every problem found during one build pass, joined together.
///
/// A caller sees all problems at once instead of fixing them one at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildErrors {
    items: Vec<BuildIssue>,
}

impl BuildErrors {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one issue
    pub fn push(&mut self, qname: QName, issue: FieldIssue) {
        self.items.push(BuildIssue { qname, issue });
    }

    /// Absorb another collection
    pub fn merge(&mut self, other: BuildErrors) {
        self.items.extend(other.items);
    }

    /// Returns true when no issue was recorded
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of recorded issues
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// The recorded issues
    pub fn items(&self) -> &[BuildIssue] {
        &self.items
    }

    /// `Ok` when empty, `Err(self)` otherwise
    pub fn into_result(self) -> Result<(), BuildErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.is_empty() {
            return write!(f, "no build errors");
        }
        write!(f, "{} build error(s): ", self.items.len())?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildErrors {}

/// Malformed or truncated binary input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended before the named element could be read
    #[error("unexpected end of data reading {0}")]
    UnexpectedEof(&'static str),

    /// Leading codec version byte is not supported
    #[error("unknown codec version {0}")]
    UnknownCodecVersion(u8),

    /// User-field buffer failed its integrity check
    #[error("user field buffer checksum mismatch: computed {computed:08x}, stored {stored:08x}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes
        computed: u32,
        /// Checksum carried by the buffer
        stored: u32,
    },

    /// Structurally invalid content
    #[error("corrupted data: {0}")]
    Corrupted(String),
}

/// Any row operation failure
#[derive(Debug, Error)]
pub enum RowError {
    /// Aggregated build problems
    #[error(transparent)]
    Build(#[from] BuildErrors),

    /// Malformed binary input
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Identifier cache failure
    #[error(transparent)]
    Names(#[from] NamesError),

    /// Schema lookup failure
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Result type for row operations
pub type RowResult<T> = Result<T, RowError>;
