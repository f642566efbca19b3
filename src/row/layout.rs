//! Compiled per-type field layouts
//!
//! Each declared type compiles once into a [`RowLayout`]: fields in
//! declaration order with their restrictions compiled (patterns become
//! `regex::Regex`), plus the set of system fields the type kind implies.
//! Layouts are cached and shared; every row of a type borrows the same
//! compiled layout.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;

use crate::names::QName;
use crate::schema::{DataKind, SchemaError, SchemaResult, Schemas, TypeDef, TypeKind};
use crate::tokens::VerificationKind;

/// Which system fields a row carries, decided by its type kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SysFields {
    /// Record identifier
    pub id: bool,
    /// Parent record identifier
    pub parent: bool,
    /// Container name within the parent
    pub container: bool,
    /// Active flag
    pub is_active: bool,
}

/// Returns the system fields implied by a type kind
pub fn sys_fields_for(kind: TypeKind) -> SysFields {
    match kind {
        TypeKind::Doc => SysFields {
            id: true,
            is_active: true,
            ..SysFields::default()
        },
        TypeKind::Record => SysFields {
            id: true,
            parent: true,
            container: true,
            is_active: true,
        },
        TypeKind::Element => SysFields {
            container: true,
            ..SysFields::default()
        },
        TypeKind::Object | TypeKind::View => SysFields::default(),
    }
}

/// One field of a compiled layout
#[derive(Debug)]
pub struct LayoutField {
    /// Field name
    pub name: String,
    /// Field data kind
    pub data_kind: DataKind,
    /// Whether the field must carry a value
    pub required: bool,
    /// Verification required before a value is accepted
    pub verify: Option<VerificationKind>,
    /// Minimum length for string and byte values
    pub min_len: Option<u32>,
    /// Maximum length for string and byte values
    pub max_len: Option<u32>,
    /// Compiled pattern restriction
    pub pattern: Option<Regex>,
    /// Allowed target types for record-id references; empty means any
    pub ref_to: Vec<QName>,
}

/// Compiled layout of one declared type
#[derive(Debug)]
pub struct RowLayout {
    qname: QName,
    kind: TypeKind,
    singleton: bool,
    sys: SysFields,
    fields: Vec<LayoutField>,
    by_name: HashMap<String, usize>,
}

impl RowLayout {
    /// Compile a type declaration.
    ///
    /// An invalid pattern restriction is a fatal schema error caught here,
    /// at preparation, not when the first value arrives.
    pub fn compile(def: &TypeDef) -> SchemaResult<Arc<RowLayout>> {
        let mut fields = Vec::with_capacity(def.fields.len());
        let mut by_name = HashMap::with_capacity(def.fields.len());

        for (i, f) in def.fields.iter().enumerate() {
            let pattern = match &f.pattern {
                None => None,
                Some(p) => Some(Regex::new(p).map_err(|e| {
                    SchemaError::invalid(format!(
                        "type '{}': field '{}' has invalid pattern: {}",
                        def.qname, f.name, e
                    ))
                })?),
            };
            fields.push(LayoutField {
                name: f.name.clone(),
                data_kind: f.data_kind,
                required: f.required,
                verify: f.verify,
                min_len: f.min_len,
                max_len: f.max_len,
                pattern,
                ref_to: f.ref_to.clone(),
            });
            by_name.insert(f.name.clone(), i);
        }

        Ok(Arc::new(RowLayout {
            qname: def.qname.clone(),
            kind: def.kind,
            singleton: def.singleton,
            sys: sys_fields_for(def.kind),
            fields,
            by_name,
        }))
    }

    /// The compiled type's qualified name
    pub fn qname(&self) -> &QName {
        &self.qname
    }

    /// The compiled type's kind
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Whether the type is a singleton document
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// System fields rows of this type carry
    pub fn sys(&self) -> SysFields {
        self.sys
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<(usize, &LayoutField)> {
        self.by_name.get(name).map(|&i| (i, &self.fields[i]))
    }

    /// Field at a layout position
    pub fn field_at(&self, index: usize) -> Option<&LayoutField> {
        self.fields.get(index)
    }

    /// Fields in layout order
    pub fn fields(&self) -> &[LayoutField] {
        &self.fields
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true for a type without declared fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Cache of compiled layouts, filled during preparation
#[derive(Debug, Default)]
pub struct LayoutCache {
    layouts: RwLock<HashMap<QName, Arc<RowLayout>>>,
}

impl LayoutCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and cache every declared type
    pub fn compile_all(&self, schemas: &Schemas) -> SchemaResult<()> {
        let mut map = self.write();
        for def in schemas.types() {
            if !map.contains_key(&def.qname) {
                map.insert(def.qname.clone(), RowLayout::compile(def)?);
            }
        }
        Ok(())
    }

    /// Look up a compiled layout
    pub fn get(&self, qname: &QName) -> Option<Arc<RowLayout>> {
        self.read().get(qname).cloned()
    }

    /// Number of cached layouts
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true when nothing is cached yet
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<QName, Arc<RowLayout>>> {
        match self.layouts.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<QName, Arc<RowLayout>>> {
        match self.layouts.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
