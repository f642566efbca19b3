//! Qualified names
//!
//! A qualified name is a two-part `pkg.entity` pair identifying a type,
//! command or view. It is an immutable value type, globally comparable and
//! used as a map key throughout the engine.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Separator between the package and entity parts
pub const QNAME_SEPARATOR: char = '.';

/// Two-part qualified name (`pkg.entity`).
///
/// The null qualified name has two empty parts and stands for "no type".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct QName {
    pkg: String,
    entity: String,
}

impl QName {
    /// Create a qualified name from its parts
    pub fn new(pkg: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            pkg: pkg.into(),
            entity: entity.into(),
        }
    }

    /// The null qualified name
    pub fn null() -> Self {
        Self::default()
    }

    /// Parse a `pkg.entity` string.
    ///
    /// The empty string parses to the null name. Anything else must contain
    /// exactly one separator with non-empty parts on both sides.
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Ok(Self::null());
        }
        let mut parts = s.split(QNAME_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(pkg), Some(entity), None) if !pkg.is_empty() && !entity.is_empty() => {
                Ok(Self::new(pkg, entity))
            }
            _ => Err(format!("invalid qualified name '{}'", s)),
        }
    }

    /// Package part
    pub fn pkg(&self) -> &str {
        &self.pkg
    }

    /// Entity part
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns true for the null qualified name
    pub fn is_null(&self) -> bool {
        self.pkg.is_empty() && self.entity.is_empty()
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            Ok(())
        } else {
            write!(f, "{}{}{}", self.pkg, QNAME_SEPARATOR, self.entity)
        }
    }
}

impl Serialize for QName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for QName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QNameVisitor;

        impl<'de> Visitor<'de> for QNameVisitor {
            type Value = QName;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a qualified name string 'pkg.entity'")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<QName, E> {
                QName::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(QNameVisitor)
    }
}

/// Well-known system names
pub mod sys {
    use super::QName;

    /// System package
    pub const PKG: &str = "sys";

    /// Marker name carried by events that failed to build or decode
    pub fn qname_error() -> QName {
        QName::new(PKG, "Error")
    }

    /// Built-in command applying a bare CUD set with no argument object
    pub fn qname_cud() -> QName {
        QName::new(PKG, "CUD")
    }
}
