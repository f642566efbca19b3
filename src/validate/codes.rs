//! Validation error categories
//!
//! Every violation carries a numeric category code so callers can branch
//! on error kind without string matching.

use std::fmt;

use crate::names::QName;

/// Numeric violation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ValidateCode {
    /// A row or node carries the null type name
    EmptyTypeName = 1,
    /// Type or command is not declared
    UnknownType = 2,
    /// A schema-required field has no value
    RequiredField = 3,
    /// A required reference field holds the null identifier
    NullReference = 4,
    /// A container holds fewer children than its declared minimum
    OccursMin = 5,
    /// A container holds more children than its declared maximum
    OccursMax = 6,
    /// A child sits in a container its parent type does not declare
    UnknownContainer = 7,
    /// A child's type does not match its container's declared target
    ContainerTypeMismatch = 8,
    /// A raw reference does not point at a create in the same event
    UnresolvedReference = 9,
    /// A reference points at a create of a disallowed type
    ReferenceTypeMismatch = 10,
    /// An identifier is used by more than one operation in the CUD set
    RecordIdUniqueness = 11,
    /// A singleton type is created more than once in one event
    SingletonViolation = 12,
    /// A bare CUD event carries no operation
    EmptyCud = 13,
    /// An argument object is missing or of the wrong type
    WrongArgumentType = 14,
}

impl ValidateCode {
    /// The numeric category
    pub fn code(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for ValidateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Violation category
    pub code: ValidateCode,
    /// Type (or command) the violation is about
    pub qname: QName,
    /// Human-readable detail
    pub message: String,
}

impl Violation {
    /// Create a violation
    pub fn new(code: ValidateCode, qname: QName, message: impl Into<String>) -> Self {
        Self {
            code,
            qname,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] '{}': {}", self.code, self.qname, self.message)
    }
}

/// Every violation found during one validation pass, joined together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidateErrors {
    items: Vec<Violation>,
}

impl ValidateErrors {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one violation
    pub fn push(&mut self, violation: Violation) {
        self.items.push(violation);
    }

    /// Returns true when no violation was recorded
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of recorded violations
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// The recorded violations
    pub fn items(&self) -> &[Violation] {
        &self.items
    }

    /// Returns true when any violation carries the given category
    pub fn has(&self, code: ValidateCode) -> bool {
        self.items.iter().any(|v| v.code == code)
    }

    /// `Ok` when empty, `Err(self)` otherwise
    pub fn into_result(self) -> Result<(), ValidateErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidateErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.is_empty() {
            return write!(f, "no violations");
        }
        write!(f, "{} violation(s): ", self.items.len())?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidateErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ValidateCode::EmptyTypeName.code(), 1);
        assert_eq!(ValidateCode::OccursMin.code(), 5);
        assert_eq!(ValidateCode::RecordIdUniqueness.code(), 11);
        assert_eq!(ValidateCode::EmptyCud.code(), 13);
    }

    #[test]
    fn test_errors_join_and_query() {
        let mut errs = ValidateErrors::new();
        errs.push(Violation::new(
            ValidateCode::OccursMin,
            QName::new("app", "order"),
            "container 'lines' holds 0 children, minimum is 1",
        ));
        errs.push(Violation::new(
            ValidateCode::RequiredField,
            QName::new("app", "line"),
            "field 'qty' has no value",
        ));

        assert!(errs.has(ValidateCode::OccursMin));
        assert!(!errs.has(ValidateCode::OccursMax));
        let text = format!("{}", errs);
        assert!(text.contains("OccursMin"));
        assert!(text.contains("'qty'"));
    }
}
