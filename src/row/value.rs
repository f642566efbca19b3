//! Field values
//!
//! A closed tagged union over every data kind the schema can declare, so
//! the codec's set/get paths are exhaustive matches instead of dynamic
//! casts.

use crate::names::QName;
use crate::record::RecordId;
use crate::schema::DataKind;

use super::row::Row;

/// One field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Byte string
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Qualified-name reference
    QName(QName),
    /// Boolean
    Bool(bool),
    /// Record-id reference
    RecordId(RecordId),
    /// Nested record value
    Record(Box<Row>),
    /// Nested event value
    Event(Box<crate::event::Event>),
}

impl Value {
    /// The data kind of this value
    pub fn data_kind(&self) -> DataKind {
        match self {
            Value::Int32(_) => DataKind::Int32,
            Value::Int64(_) => DataKind::Int64,
            Value::Float32(_) => DataKind::Float32,
            Value::Float64(_) => DataKind::Float64,
            Value::Bytes(_) => DataKind::Bytes,
            Value::String(_) => DataKind::String,
            Value::QName(_) => DataKind::QName,
            Value::Bool(_) => DataKind::Bool,
            Value::RecordId(_) => DataKind::RecordId,
            Value::Record(_) => DataKind::Record,
            Value::Event(_) => DataKind::Event,
        }
    }

    /// The kind name for error messages
    pub fn kind_name(&self) -> &'static str {
        self.data_kind().kind_name()
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<QName> for Value {
    fn from(v: QName) -> Self {
        Value::QName(v)
    }
}

impl From<RecordId> for Value {
    fn from(v: RecordId) -> Self {
        Value::RecordId(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
