//! Declared-schema subsystem for emberdb
//!
//! Holds the application's declared types, fields, containers and commands,
//! with JSON export/import and structural self-checks. Consumed read-only
//! once preparation starts; the row codec compiles it into cached layouts.
//!
//! # Design Principles
//!
//! - A row's field set is fully determined by its resolved type
//! - Containers bind a name to a target type and occurs bounds
//! - Singletons are documents with at most one live instance
//! - Commands fix their argument types up front

mod errors;
mod types;

pub use errors::{SchemaError, SchemaErrorCode, SchemaResult, Severity};
pub use types::{
    CommandDef, ContainerDef, DataKind, FieldDef, Occurs, Schemas, TypeDef, TypeKind,
};
