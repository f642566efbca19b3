//! The row: a typed, flat set of field values
//!
//! A row is the atomic encodable unit. Its field set is fully determined by
//! its compiled layout; unknown field names, wrong value kinds, restriction
//! violations and failed token verifications are collected as the caller
//! goes and surfaced together by `build()`, never one at a time.
//!
//! Setting a string or byte field to empty marks the field nilled, distinct
//! from never having been set. Nils are deduplicated, cleared by a later
//! non-empty set and survive rebuilds.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::names::QName;
use crate::record::RecordId;
use crate::schema::{DataKind, TypeKind};
use crate::tokens::TokenVerifier;

use super::errors::{BuildErrors, FieldIssue};
use super::layout::RowLayout;
use super::value::Value;

/// Placeholder stored into text fields by redaction
pub const MASKED_STRING: &str = "*";

/// A typed row of field values backed by a compiled layout
#[derive(Clone)]
pub struct Row {
    layout: Arc<RowLayout>,
    verifier: Option<Arc<dyn TokenVerifier>>,
    values: Vec<Option<Value>>,
    nils: BTreeSet<usize>,
    issues: BTreeMap<String, FieldIssue>,
    id: RecordId,
    parent: RecordId,
    container: String,
    is_active: bool,
}

impl Row {
    /// Create an empty row over a compiled layout
    pub fn new(layout: Arc<RowLayout>) -> Self {
        let len = layout.len();
        Self {
            layout,
            verifier: None,
            values: vec![None; len],
            nils: BTreeSet::new(),
            issues: BTreeMap::new(),
            id: RecordId::NULL,
            parent: RecordId::NULL,
            container: String::new(),
            is_active: true,
        }
    }

    /// Attach the token verifier consulted by verifiable fields
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// The row's compiled layout
    pub fn layout(&self) -> &Arc<RowLayout> {
        &self.layout
    }

    /// The row's type
    pub fn qname(&self) -> &QName {
        self.layout.qname()
    }

    /// The row's type kind
    pub fn kind(&self) -> TypeKind {
        self.layout.kind()
    }

    // ------------------------------------------------------------------
    // System fields
    // ------------------------------------------------------------------

    /// Record identifier
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Set the record identifier
    pub fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    /// Parent record identifier
    pub fn parent(&self) -> RecordId {
        self.parent
    }

    /// Set the parent record identifier
    pub fn set_parent(&mut self, parent: RecordId) {
        self.parent = parent;
    }

    /// Container name within the parent
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Set the container name within the parent
    pub fn set_container(&mut self, container: impl Into<String>) {
        self.container = container.into();
    }

    /// Active flag
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Set the active flag
    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    // ------------------------------------------------------------------
    // User fields
    // ------------------------------------------------------------------

    /// Set a field value.
    ///
    /// Rejections are collected, not returned; `build()` surfaces them all.
    /// An empty string or byte value marks the field nilled instead.
    pub fn set(&mut self, name: &str, value: Value) {
        let (idx, expected, verify) = match self.layout.field(name) {
            Some((idx, field)) => (idx, field.data_kind, field.verify),
            None => {
                self.issues.insert(
                    name.to_string(),
                    FieldIssue::NameNotFound {
                        field: name.to_string(),
                    },
                );
                return;
            }
        };

        let value = if let Some(kind) = verify {
            match self.verify_value(name, expected, kind, value) {
                Ok(v) => v,
                Err(issue) => {
                    self.issues.insert(name.to_string(), issue);
                    return;
                }
            }
        } else {
            value
        };

        if value.data_kind() != expected {
            self.issues.insert(
                name.to_string(),
                FieldIssue::WrongType {
                    field: name.to_string(),
                    actual: value.kind_name(),
                    expected: expected.kind_name(),
                },
            );
            return;
        }

        // Empty strings and byte strings become explicit nils.
        let is_nil = match &value {
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            _ => false,
        };
        if is_nil {
            self.values[idx] = None;
            self.nils.insert(idx);
            self.issues.remove(name);
            return;
        }

        if let Err(issue) = self.check_restrictions(name, idx, &value) {
            self.issues.insert(name.to_string(), issue);
            return;
        }

        self.values[idx] = Some(value);
        self.nils.remove(&idx);
        self.issues.remove(name);
    }

    /// Set a 32-bit integer field
    pub fn set_int32(&mut self, name: &str, value: i32) {
        self.set(name, Value::Int32(value));
    }

    /// Set a 64-bit integer field
    pub fn set_int64(&mut self, name: &str, value: i64) {
        self.set(name, Value::Int64(value));
    }

    /// Set a 32-bit float field
    pub fn set_float32(&mut self, name: &str, value: f32) {
        self.set(name, Value::Float32(value));
    }

    /// Set a 64-bit float field
    pub fn set_float64(&mut self, name: &str, value: f64) {
        self.set(name, Value::Float64(value));
    }

    /// Set a string field
    pub fn set_string(&mut self, name: &str, value: impl Into<String>) {
        self.set(name, Value::String(value.into()));
    }

    /// Set a byte string field
    pub fn set_bytes(&mut self, name: &str, value: Vec<u8>) {
        self.set(name, Value::Bytes(value));
    }

    /// Set a boolean field
    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set(name, Value::Bool(value));
    }

    /// Set a qualified-name field
    pub fn set_qname(&mut self, name: &str, value: QName) {
        self.set(name, Value::QName(value));
    }

    /// Set a record-id reference field
    pub fn set_record_id(&mut self, name: &str, value: RecordId) {
        self.set(name, Value::RecordId(value));
    }

    /// The value of a field, if set
    pub fn get(&self, name: &str) -> Option<&Value> {
        let (idx, _) = self.layout.field(name)?;
        self.values[idx].as_ref()
    }

    /// Returns true when the field carries a value
    pub fn has_value(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns true when the field was explicitly set to empty
    pub fn is_nil(&self, name: &str) -> bool {
        match self.layout.field(name) {
            Some((idx, _)) => self.nils.contains(&idx),
            None => false,
        }
    }

    /// 32-bit integer value, 0 when unset
    pub fn as_int32(&self, name: &str) -> i32 {
        match self.get(name) {
            Some(Value::Int32(v)) => *v,
            _ => 0,
        }
    }

    /// 64-bit integer value, 0 when unset
    pub fn as_int64(&self, name: &str) -> i64 {
        match self.get(name) {
            Some(Value::Int64(v)) => *v,
            _ => 0,
        }
    }

    /// 32-bit float value, 0 when unset
    pub fn as_float32(&self, name: &str) -> f32 {
        match self.get(name) {
            Some(Value::Float32(v)) => *v,
            _ => 0.0,
        }
    }

    /// 64-bit float value, 0 when unset
    pub fn as_float64(&self, name: &str) -> f64 {
        match self.get(name) {
            Some(Value::Float64(v)) => *v,
            _ => 0.0,
        }
    }

    /// String value, empty when unset
    pub fn as_string(&self, name: &str) -> &str {
        match self.get(name) {
            Some(Value::String(v)) => v,
            _ => "",
        }
    }

    /// Byte string value, empty when unset
    pub fn as_bytes(&self, name: &str) -> &[u8] {
        match self.get(name) {
            Some(Value::Bytes(v)) => v,
            _ => &[],
        }
    }

    /// Boolean value, false when unset
    pub fn as_bool(&self, name: &str) -> bool {
        matches!(self.get(name), Some(Value::Bool(true)))
    }

    /// Qualified-name value, null when unset
    pub fn as_qname(&self, name: &str) -> QName {
        match self.get(name) {
            Some(Value::QName(v)) => v.clone(),
            _ => QName::null(),
        }
    }

    /// Record-id value, null when unset
    pub fn as_record_id(&self, name: &str) -> RecordId {
        match self.get(name) {
            Some(Value::RecordId(v)) => *v,
            _ => RecordId::NULL,
        }
    }

    // ------------------------------------------------------------------
    // Build
    // ------------------------------------------------------------------

    /// Surface every collected rejection plus missing required fields as
    /// one aggregated error. Succeeds silently when nothing is wrong.
    pub fn build(&self) -> Result<(), BuildErrors> {
        let mut errs = self.collected_issues();
        for (idx, field) in self.layout.fields().iter().enumerate() {
            if field.required && self.values[idx].is_none() {
                errs.push(
                    self.qname().clone(),
                    FieldIssue::NameNotFound {
                        field: field.name.clone(),
                    },
                );
            }
        }
        errs.into_result()
    }

    /// Collected rejections only, without the required-field pass. Delta
    /// rows legitimately omit required fields.
    pub(crate) fn collected_issues(&self) -> BuildErrors {
        let mut errs = BuildErrors::new();
        for issue in self.issues.values() {
            errs.push(self.qname().clone(), issue.clone());
        }
        errs
    }

    /// Replace every user field value with an inert placeholder, leaving
    /// system fields untouched. Used when a row must be exposed without
    /// revealing payload contents.
    pub fn mask_values(&mut self) {
        for idx in 0..self.values.len() {
            let masked = match self.values[idx].take() {
                None => None,
                Some(value) => match value {
                    Value::Int32(_) => Some(Value::Int32(0)),
                    Value::Int64(_) => Some(Value::Int64(0)),
                    Value::Float32(_) => Some(Value::Float32(0.0)),
                    Value::Float64(_) => Some(Value::Float64(0.0)),
                    Value::String(_) => Some(Value::String(MASKED_STRING.to_string())),
                    Value::Bool(_) => Some(Value::Bool(false)),
                    Value::QName(_) => Some(Value::QName(QName::null())),
                    Value::RecordId(_) => Some(Value::RecordId(RecordId::NULL)),
                    Value::Bytes(_) | Value::Record(_) | Value::Event(_) => None,
                },
            };
            self.values[idx] = masked;
        }
    }

    /// Drop all field values and collected issues, releasing nested rows
    /// recursively. The row can be refilled afterwards; nils are kept so a
    /// rebuild still serializes them.
    pub fn release(&mut self) {
        for slot in &mut self.values {
            if let Some(Value::Record(mut row)) = slot.take() {
                row.release();
            }
        }
        self.issues.clear();
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    /// Decode and check a token presented for a verifiable field
    fn verify_value(
        &self,
        name: &str,
        expected: DataKind,
        kind: crate::tokens::VerificationKind,
        value: Value,
    ) -> Result<Value, FieldIssue> {
        let token = match value {
            Value::String(token) => token,
            other => {
                return Err(FieldIssue::WrongType {
                    field: name.to_string(),
                    actual: other.kind_name(),
                    expected: "verified token string",
                });
            }
        };

        let verifier = self.verifier.as_ref().ok_or_else(|| {
            FieldIssue::VerificationFailed {
                field: name.to_string(),
                detail: "no token verifier configured".to_string(),
            }
        })?;

        let payload = verifier
            .verify(&token)
            .map_err(|e| FieldIssue::VerificationFailed {
                field: name.to_string(),
                detail: e.to_string(),
            })?;

        if payload.entity != *self.qname() || payload.field != name || payload.kind != kind {
            return Err(FieldIssue::VerificationFailed {
                field: name.to_string(),
                detail: format!(
                    "token issued for '{}'.'{}' ({}), not this field",
                    payload.entity,
                    payload.field,
                    payload.kind.as_str()
                ),
            });
        }

        Ok(match expected {
            DataKind::Bytes => Value::Bytes(payload.value.into_bytes()),
            _ => Value::String(payload.value),
        })
    }

    /// Check length and pattern restrictions on string and byte values
    fn check_restrictions(&self, name: &str, idx: usize, value: &Value) -> Result<(), FieldIssue> {
        let field = match self.layout.field_at(idx) {
            Some(f) => f,
            None => return Ok(()),
        };
        let len = match value {
            Value::String(s) => Some(s.len()),
            Value::Bytes(b) => Some(b.len()),
            _ => None,
        };
        if let Some(len) = len {
            if let Some(min) = field.min_len {
                if len < min as usize {
                    return Err(FieldIssue::Restricted {
                        field: name.to_string(),
                        detail: format!("value shorter than {} bytes", min),
                    });
                }
            }
            if let Some(max) = field.max_len {
                if len > max as usize {
                    return Err(FieldIssue::Restricted {
                        field: name.to_string(),
                        detail: format!("value longer than {} bytes", max),
                    });
                }
            }
        }
        if let (Value::String(s), Some(pattern)) = (value, field.pattern.as_ref()) {
            if !pattern.is_match(s) {
                return Err(FieldIssue::Restricted {
                    field: name.to_string(),
                    detail: format!("value does not match pattern '{}'", pattern.as_str()),
                });
            }
        }
        Ok(())
    }

    /// Raw access for the codec: value at a layout position
    pub(crate) fn value_at(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx).and_then(|v| v.as_ref())
    }

    /// Raw access for the codec: store a decoded value, bypassing checks.
    /// A value and a nil marker are mutually exclusive on one field.
    pub(crate) fn put_decoded(&mut self, idx: usize, value: Value) {
        if idx < self.values.len() {
            self.values[idx] = Some(value);
            self.nils.remove(&idx);
        }
    }

    /// Raw access for the codec: mark a nilled field index
    pub(crate) fn put_nil(&mut self, idx: usize) {
        if idx < self.values.len() {
            self.values[idx] = None;
            self.nils.insert(idx);
        }
    }

    /// Nilled field indexes, in ascending order
    pub(crate) fn nil_indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.nils.iter().copied()
    }

    /// Number of nilled fields
    pub(crate) fn nil_count(&self) -> usize {
        self.nils.len()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("qname", self.qname())
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("container", &self.container)
            .field("is_active", &self.is_active)
            .field("values", &self.values)
            .field("nils", &self.nils)
            .field("issues", &self.issues)
            .finish()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.qname() == other.qname()
            && self.id == other.id
            && self.parent == other.parent
            && self.container == other.container
            && self.is_active == other.is_active
            && self.values == other.values
            && self.nils == other.nils
    }
}
