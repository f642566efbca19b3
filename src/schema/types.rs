//! Declared application schema
//!
//! The schema collaborator supplies, per qualified name, the type kind,
//! declared fields (name, data kind, required flag, restrictions), declared
//! containers (name, target type, occurs bounds) and the singleton flag,
//! plus the registered commands with their argument types. It is consumed
//! read-only at preparation time; the row codec compiles it into per-type
//! layouts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::names::{sys, QName};
use crate::tokens::VerificationKind;

use super::errors::{SchemaError, SchemaResult};

/// Kind of a declared type.
///
/// The kind decides which system fields a row of this type carries:
/// documents have identity and an active flag, contained records add the
/// parent link and container name, objects and views have none, elements
/// carry only their container name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Top-level document with identity
    Doc,
    /// Record contained in a document tree
    Record,
    /// Argument object without identity
    Object,
    /// Nested element of an argument object
    Element,
    /// Projection view
    View,
}

/// Data kind of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Byte string
    Bytes,
    /// UTF-8 string
    String,
    /// Qualified-name reference
    QName,
    /// Boolean
    Bool,
    /// Record-id reference
    RecordId,
    /// Nested record value
    Record,
    /// Nested event value
    Event,
}

impl DataKind {
    /// Returns the kind name for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            DataKind::Int32 => "int32",
            DataKind::Int64 => "int64",
            DataKind::Float32 => "float32",
            DataKind::Float64 => "float64",
            DataKind::Bytes => "bytes",
            DataKind::String => "string",
            DataKind::QName => "qname",
            DataKind::Bool => "bool",
            DataKind::RecordId => "recordid",
            DataKind::Record => "record",
            DataKind::Event => "event",
        }
    }
}

/// Field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name, unique within the type
    pub name: String,
    /// Field data kind
    pub data_kind: DataKind,
    /// Whether the field must carry a value
    pub required: bool,
    /// Verification required before a value is accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerificationKind>,
    /// Minimum length for string and byte values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<u32>,
    /// Maximum length for string and byte values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<u32>,
    /// Pattern restriction for string values (compiled at preparation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Allowed target types for record-id references; empty means any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ref_to: Vec<QName>,
}

impl FieldDef {
    /// Create a required field
    pub fn required(name: impl Into<String>, data_kind: DataKind) -> Self {
        Self {
            name: name.into(),
            data_kind,
            required: true,
            verify: None,
            min_len: None,
            max_len: None,
            pattern: None,
            ref_to: Vec::new(),
        }
    }

    /// Create an optional field
    pub fn optional(name: impl Into<String>, data_kind: DataKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, data_kind)
        }
    }

    /// Require values to arrive as verified tokens of the given kind
    pub fn verified(mut self, kind: VerificationKind) -> Self {
        self.verify = Some(kind);
        self
    }

    /// Restrict the minimum value length
    pub fn with_min_len(mut self, len: u32) -> Self {
        self.min_len = Some(len);
        self
    }

    /// Restrict the maximum value length
    pub fn with_max_len(mut self, len: u32) -> Self {
        self.max_len = Some(len);
        self
    }

    /// Restrict string values to a pattern
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Restrict a record-id reference to the given target types
    pub fn with_ref_to(mut self, targets: Vec<QName>) -> Self {
        self.ref_to = targets;
        self
    }
}

/// Upper occurs bound of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occurs {
    /// At most this many children
    Bounded(u16),
    /// No upper bound
    Unbounded,
}

impl Occurs {
    /// Returns true when `count` exceeds the bound
    pub fn exceeded_by(&self, count: usize) -> bool {
        match self {
            Occurs::Bounded(max) => count > usize::from(*max),
            Occurs::Unbounded => false,
        }
    }
}

/// Container declaration on a composite type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDef {
    /// Container name, unique within the type
    pub name: String,
    /// Type of the contained children
    pub qname: QName,
    /// Minimum number of children
    pub min_occurs: u16,
    /// Maximum number of children
    pub max_occurs: Occurs,
}

impl ContainerDef {
    /// Declare a container
    pub fn new(
        name: impl Into<String>,
        qname: QName,
        min_occurs: u16,
        max_occurs: Occurs,
    ) -> Self {
        Self {
            name: name.into(),
            qname,
            min_occurs,
            max_occurs,
        }
    }
}

/// Type declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Qualified type name
    pub qname: QName,
    /// Type kind
    pub kind: TypeKind,
    /// At most one live instance per workspace
    #[serde(default)]
    pub singleton: bool,
    /// Declared fields, in declaration order
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Declared containers, in declaration order
    #[serde(default)]
    pub containers: Vec<ContainerDef>,
}

impl TypeDef {
    /// Declare a type
    pub fn new(qname: QName, kind: TypeKind) -> Self {
        Self {
            qname,
            kind,
            singleton: false,
            fields: Vec::new(),
            containers: Vec::new(),
        }
    }

    /// Mark the type as a singleton
    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    /// Add a field declaration
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a container declaration
    pub fn with_container(mut self, container: ContainerDef) -> Self {
        self.containers.push(container);
        self
    }

    /// Find a declared field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find a declared container by name
    pub fn container(&self, name: &str) -> Option<&ContainerDef> {
        self.containers.iter().find(|c| c.name == name)
    }
}

/// Registered command with its argument types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDef {
    /// Command name
    pub name: QName,
    /// Expected argument object type, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<QName>,
    /// Expected unlogged argument object type, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlogged_arg: Option<QName>,
}

impl CommandDef {
    /// Register a command without arguments
    pub fn new(name: QName) -> Self {
        Self {
            name,
            arg: None,
            unlogged_arg: None,
        }
    }

    /// Set the expected argument type
    pub fn with_arg(mut self, arg: QName) -> Self {
        self.arg = Some(arg);
        self
    }

    /// Set the expected unlogged argument type
    pub fn with_unlogged_arg(mut self, arg: QName) -> Self {
        self.unlogged_arg = Some(arg);
        self
    }
}

/// The declared application schema: types plus registered commands.
///
/// Keys are kept in an ordered map so JSON export and preparation-time
/// registration are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schemas {
    types: BTreeMap<QName, TypeDef>,
    commands: BTreeMap<QName, CommandDef>,
}

impl Schemas {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a type
    pub fn add_type(&mut self, def: TypeDef) -> SchemaResult<()> {
        if def.qname.is_null() {
            return Err(SchemaError::invalid("type with null qualified name"));
        }
        if self.types.contains_key(&def.qname) {
            return Err(SchemaError::duplicate(&def.qname));
        }
        self.types.insert(def.qname.clone(), def);
        Ok(())
    }

    /// Register a command
    pub fn add_command(&mut self, def: CommandDef) -> SchemaResult<()> {
        if def.name.is_null() {
            return Err(SchemaError::invalid("command with null qualified name"));
        }
        if self.commands.contains_key(&def.name) {
            return Err(SchemaError::duplicate(&def.name));
        }
        self.commands.insert(def.name.clone(), def);
        Ok(())
    }

    /// Look up a declared type
    pub fn type_def(&self, qname: &QName) -> Option<&TypeDef> {
        self.types.get(qname)
    }

    /// Look up a registered command.
    ///
    /// The built-in `sys.CUD` command is always registered and carries no
    /// argument objects.
    pub fn command(&self, name: &QName) -> Option<CommandDef> {
        if *name == sys::qname_cud() {
            return Some(CommandDef::new(sys::qname_cud()));
        }
        self.commands.get(name).cloned()
    }

    /// Iterate declared types in name order
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    /// Iterate registered commands in name order
    pub fn commands(&self) -> impl Iterator<Item = &CommandDef> {
        self.commands.values()
    }

    /// Number of declared types
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Check the schema against its own structural rules: unique field and
    /// container names, container targets declared, command argument types
    /// declared as objects, singletons only on documents.
    pub fn validate_structure(&self) -> SchemaResult<()> {
        for def in self.types.values() {
            for (i, field) in def.fields.iter().enumerate() {
                if field.name.is_empty() {
                    return Err(SchemaError::invalid(format!(
                        "type '{}': field with empty name",
                        def.qname
                    )));
                }
                if def.fields[..i].iter().any(|f| f.name == field.name) {
                    return Err(SchemaError::invalid(format!(
                        "type '{}': field '{}' declared twice",
                        def.qname, field.name
                    )));
                }
                if field.verify.is_some()
                    && !matches!(field.data_kind, DataKind::String | DataKind::Bytes)
                {
                    return Err(SchemaError::invalid(format!(
                        "type '{}': field '{}' is verifiable but not a string or byte field",
                        def.qname, field.name
                    )));
                }
                if !field.ref_to.is_empty() && field.data_kind != DataKind::RecordId {
                    return Err(SchemaError::invalid(format!(
                        "type '{}': field '{}' restricts targets but is not a reference",
                        def.qname, field.name
                    )));
                }
            }
            for (i, container) in def.containers.iter().enumerate() {
                if container.name.is_empty() {
                    return Err(SchemaError::invalid(format!(
                        "type '{}': container with empty name",
                        def.qname
                    )));
                }
                if def.containers[..i].iter().any(|c| c.name == container.name) {
                    return Err(SchemaError::invalid(format!(
                        "type '{}': container '{}' declared twice",
                        def.qname, container.name
                    )));
                }
                if !self.types.contains_key(&container.qname) {
                    return Err(SchemaError::invalid(format!(
                        "type '{}': container '{}' targets undeclared type '{}'",
                        def.qname, container.name, container.qname
                    )));
                }
                if let Occurs::Bounded(max) = container.max_occurs {
                    if usize::from(max) < usize::from(container.min_occurs) {
                        return Err(SchemaError::invalid(format!(
                            "type '{}': container '{}' has max occurs below min occurs",
                            def.qname, container.name
                        )));
                    }
                }
            }
            if def.singleton && def.kind != TypeKind::Doc {
                return Err(SchemaError::invalid(format!(
                    "type '{}': only documents can be singletons",
                    def.qname
                )));
            }
        }

        for cmd in self.commands.values() {
            for arg in [&cmd.arg, &cmd.unlogged_arg].into_iter().flatten() {
                match self.types.get(arg) {
                    None => {
                        return Err(SchemaError::invalid(format!(
                            "command '{}': argument type '{}' is not declared",
                            cmd.name, arg
                        )));
                    }
                    Some(def) if !matches!(def.kind, TypeKind::Object | TypeKind::Doc) => {
                        return Err(SchemaError::invalid(format!(
                            "command '{}': argument type '{}' must be an object or document",
                            cmd.name, arg
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Export the schema as JSON
    pub fn to_json(&self) -> SchemaResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SchemaError::invalid(format!("schema export failed: {}", e)))
    }

    /// Import a schema from JSON and run the structural checks
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let schemas: Self = serde_json::from_str(json)
            .map_err(|e| SchemaError::invalid(format!("schema import failed: {}", e)))?;
        schemas.validate_structure()?;
        Ok(schemas)
    }
}
