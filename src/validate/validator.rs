//! Schema validators
//!
//! One validator per declared type, all constructed once when the schema is
//! finalized. Validation walks the produced structures (element trees,
//! events, CUD sets) and reports every violation it finds in one pass;
//! it never mutates what it checks and never stops at the first problem.

use std::collections::{HashMap, HashSet};

use crate::event::Event;
use crate::names::{sys, QName};
use crate::record::RecordId;
use crate::record::ElementTree;
use crate::row::{Row, Value};
use crate::schema::{CommandDef, ContainerDef, DataKind, Schemas};

use super::codes::{ValidateCode, ValidateErrors, Violation};

/// Compiled checks for one declared type
struct TypeValidator {
    singleton: bool,
    /// Names of required fields
    required: Vec<String>,
    /// Names of required reference fields (must also be non-null)
    required_refs: Vec<String>,
    /// Reference fields with their allowed target types (empty = any)
    ref_fields: Vec<(String, Vec<QName>)>,
    containers: Vec<ContainerDef>,
}

/// All per-type validators plus the registered commands
pub struct Validators {
    types: HashMap<QName, TypeValidator>,
    commands: HashMap<QName, CommandDef>,
}

impl Validators {
    /// Compile validators for every declared type
    pub fn build(schemas: &Schemas) -> Self {
        let mut types = HashMap::new();
        for def in schemas.types() {
            let mut required = Vec::new();
            let mut required_refs = Vec::new();
            let mut ref_fields = Vec::new();
            for field in &def.fields {
                if field.required {
                    required.push(field.name.clone());
                }
                if field.data_kind == DataKind::RecordId {
                    if field.required {
                        required_refs.push(field.name.clone());
                    }
                    ref_fields.push((field.name.clone(), field.ref_to.clone()));
                }
            }
            types.insert(
                def.qname.clone(),
                TypeValidator {
                    singleton: def.singleton,
                    required,
                    required_refs,
                    ref_fields,
                    containers: def.containers.clone(),
                },
            );
        }

        let mut commands: HashMap<QName, CommandDef> = schemas
            .commands()
            .map(|c| (c.name.clone(), c.clone()))
            .collect();
        commands.insert(sys::qname_cud(), CommandDef::new(sys::qname_cud()));

        Self { types, commands }
    }

    /// Number of compiled type validators
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true when no type is declared
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Validate an element tree: type resolution, required fields, occurs
    /// bounds and container membership on every node
    pub fn validate_tree(&self, tree: &ElementTree) -> Result<(), ValidateErrors> {
        let mut errs = ValidateErrors::new();
        self.tree_into(tree, &mut errs);
        errs.into_result()
    }

    /// Validate an event: argument objects plus the CUD set.
    ///
    /// An event already in the built-with-error state is passed through;
    /// its failure is recorded on the event itself.
    pub fn validate_event(&self, event: &Event) -> Result<(), ValidateErrors> {
        if !event.is_valid() {
            return Ok(());
        }
        let mut errs = ValidateErrors::new();

        let name = event.name().clone();
        let command = match self.commands.get(&name) {
            Some(c) => c.clone(),
            None => {
                errs.push(Violation::new(
                    ValidateCode::UnknownType,
                    name,
                    "command is not registered",
                ));
                return errs.into_result();
            }
        };

        match (&command.arg, event.argument()) {
            (Some(expect), Some(tree)) => {
                if tree.root().row().qname() != expect {
                    errs.push(Violation::new(
                        ValidateCode::WrongArgumentType,
                        name.clone(),
                        format!(
                            "argument object is '{}', command declares '{}'",
                            tree.root().row().qname(),
                            expect
                        ),
                    ));
                }
                self.tree_into(tree, &mut errs);
            }
            (Some(expect), None) => {
                errs.push(Violation::new(
                    ValidateCode::WrongArgumentType,
                    name.clone(),
                    format!("argument object of type '{}' is missing", expect),
                ));
            }
            (None, Some(_)) => {
                errs.push(Violation::new(
                    ValidateCode::WrongArgumentType,
                    name.clone(),
                    "command declares no argument object",
                ));
            }
            (None, None) => {}
        }

        match (&command.unlogged_arg, event.unlogged_argument()) {
            (Some(expect), Some(tree)) => {
                if tree.root().row().qname() != expect {
                    errs.push(Violation::new(
                        ValidateCode::WrongArgumentType,
                        name.clone(),
                        format!(
                            "unlogged argument object is '{}', command declares '{}'",
                            tree.root().row().qname(),
                            expect
                        ),
                    ));
                }
                self.tree_into(tree, &mut errs);
            }
            (None, Some(_)) => {
                errs.push(Violation::new(
                    ValidateCode::WrongArgumentType,
                    name.clone(),
                    "command declares no unlogged argument object",
                ));
            }
            _ => {}
        }

        self.cud_into(event, &mut errs);

        if name == sys::qname_cud() && event.cud().is_empty() {
            errs.push(Violation::new(
                ValidateCode::EmptyCud,
                name,
                "event carries no create or update operation",
            ));
        }

        errs.into_result()
    }

    fn tree_into(&self, tree: &ElementTree, errs: &mut ValidateErrors) {
        for (idx, node) in tree.iter() {
            let row = node.row();
            let qname = row.qname();
            if qname.is_null() {
                errs.push(Violation::new(
                    ValidateCode::EmptyTypeName,
                    QName::null(),
                    "element carries the null type name",
                ));
                continue;
            }
            let validator = match self.types.get(qname) {
                Some(v) => v,
                None => {
                    errs.push(Violation::new(
                        ValidateCode::UnknownType,
                        qname.clone(),
                        "type is not declared",
                    ));
                    continue;
                }
            };

            self.fields_into(row, errs);

            // occurs checking, one report per declared container
            for container in &validator.containers {
                let count = tree.child_count_in(idx, &container.name);
                if count < usize::from(container.min_occurs) {
                    errs.push(Violation::new(
                        ValidateCode::OccursMin,
                        qname.clone(),
                        format!(
                            "container '{}' holds {} children, minimum is {}",
                            container.name, count, container.min_occurs
                        ),
                    ));
                }
                if container.max_occurs.exceeded_by(count) {
                    errs.push(Violation::new(
                        ValidateCode::OccursMax,
                        qname.clone(),
                        format!(
                            "container '{}' holds {} children, over the maximum",
                            container.name, count
                        ),
                    ));
                }
            }

            for &child_idx in node.children() {
                let child = match tree.node(child_idx) {
                    Some(c) => c,
                    None => continue,
                };
                match validator
                    .containers
                    .iter()
                    .find(|c| c.name == child.container())
                {
                    None => {
                        errs.push(Violation::new(
                            ValidateCode::UnknownContainer,
                            qname.clone(),
                            format!("container '{}' is not declared", child.container()),
                        ));
                    }
                    Some(c) if *child.row().qname() != c.qname => {
                        errs.push(Violation::new(
                            ValidateCode::ContainerTypeMismatch,
                            qname.clone(),
                            format!(
                                "container '{}' expects '{}', holds '{}'",
                                c.name,
                                c.qname,
                                child.row().qname()
                            ),
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    fn fields_into(&self, row: &Row, errs: &mut ValidateErrors) {
        let validator = match self.types.get(row.qname()) {
            Some(v) => v,
            None => return,
        };
        for name in &validator.required {
            if !row.has_value(name) {
                errs.push(Violation::new(
                    ValidateCode::RequiredField,
                    row.qname().clone(),
                    format!("required field '{}' has no value", name),
                ));
            }
        }
        for name in &validator.required_refs {
            if let Some(Value::RecordId(id)) = row.get(name) {
                if id.is_null() {
                    errs.push(Violation::new(
                        ValidateCode::NullReference,
                        row.qname().clone(),
                        format!("required reference '{}' holds the null identifier", name),
                    ));
                }
            }
        }
    }

    fn cud_into(&self, event: &Event, errs: &mut ValidateErrors) {
        let cud = event.cud();

        // identifiers declared by this event: creates plus identified
        // argument-tree nodes, the same table regeneration substitutes from
        let mut declared: HashMap<RecordId, QName> = HashMap::new();
        let mut singleton_seen: HashSet<QName> = HashSet::new();

        for create in cud.creates() {
            let id = create.id();
            if declared.insert(id, create.qname().clone()).is_some() {
                errs.push(Violation::new(
                    ValidateCode::RecordIdUniqueness,
                    create.qname().clone(),
                    format!("record id {} is used by more than one create", id),
                ));
            }
            if let Some(validator) = self.types.get(create.qname()) {
                if validator.singleton && !singleton_seen.insert(create.qname().clone()) {
                    errs.push(Violation::new(
                        ValidateCode::SingletonViolation,
                        create.qname().clone(),
                        "singleton created more than once in one event",
                    ));
                }
            }
            self.fields_into(create.row(), errs);
        }

        if let Some(tree) = event.argument() {
            for (_, node) in tree.iter() {
                let id = node.row().id();
                if !id.is_null() {
                    declared.entry(id).or_insert_with(|| node.row().qname().clone());
                }
            }
        }

        // one category for both directions of a create/update collision
        for (id, _) in cud.updates() {
            if declared.contains_key(id) {
                errs.push(Violation::new(
                    ValidateCode::RecordIdUniqueness,
                    event.name().clone(),
                    format!("record id {} is targeted by both a create and an update", id),
                ));
            }
        }

        for create in cud.creates() {
            self.refs_into(create.row(), &declared, errs);
            let parent = create.parent();
            if parent.is_raw() {
                self.parent_link_into(create.row(), parent, &declared, errs);
            }
        }
        for (_, update) in cud.updates() {
            self.refs_into(update.changes(), &declared, errs);
            if let Some(result) = update.result() {
                self.fields_into(result.row(), errs);
            }
        }
        if let Some(tree) = event.argument() {
            for (_, node) in tree.iter() {
                self.refs_into(node.row(), &declared, errs);
            }
        }
    }

    /// Check raw references against the identifiers declared in this event
    fn refs_into(
        &self,
        row: &Row,
        declared: &HashMap<RecordId, QName>,
        errs: &mut ValidateErrors,
    ) {
        let validator = match self.types.get(row.qname()) {
            Some(v) => v,
            None => return,
        };
        for (field, targets) in &validator.ref_fields {
            let id = match row.get(field) {
                Some(Value::RecordId(id)) => *id,
                _ => continue,
            };
            if !id.is_raw() {
                continue;
            }
            match declared.get(&id) {
                None => {
                    errs.push(Violation::new(
                        ValidateCode::UnresolvedReference,
                        row.qname().clone(),
                        format!(
                            "reference '{}' holds raw id {} not declared as a create",
                            field, id
                        ),
                    ));
                }
                Some(target_type) => {
                    if !targets.is_empty() && !targets.contains(target_type) {
                        errs.push(Violation::new(
                            ValidateCode::ReferenceTypeMismatch,
                            row.qname().clone(),
                            format!(
                                "reference '{}' points at '{}', allowed targets are {:?}",
                                field,
                                target_type,
                                targets.iter().map(|t| t.to_string()).collect::<Vec<_>>()
                            ),
                        ));
                    }
                }
            }
        }
    }

    /// A parent link is checked against the target's declared containers,
    /// not the child's
    fn parent_link_into(
        &self,
        child: &Row,
        parent: RecordId,
        declared: &HashMap<RecordId, QName>,
        errs: &mut ValidateErrors,
    ) {
        let parent_type = match declared.get(&parent) {
            Some(t) => t,
            None => {
                errs.push(Violation::new(
                    ValidateCode::UnresolvedReference,
                    child.qname().clone(),
                    format!("parent id {} is not declared as a create", parent),
                ));
                return;
            }
        };
        let parent_validator = match self.types.get(parent_type) {
            Some(v) => v,
            None => {
                errs.push(Violation::new(
                    ValidateCode::UnknownType,
                    parent_type.clone(),
                    "parent type is not declared",
                ));
                return;
            }
        };
        match parent_validator
            .containers
            .iter()
            .find(|c| c.name == child.container())
        {
            None => {
                errs.push(Violation::new(
                    ValidateCode::UnknownContainer,
                    parent_type.clone(),
                    format!(
                        "parent declares no container '{}' for child '{}'",
                        child.container(),
                        child.qname()
                    ),
                ));
            }
            Some(c) if c.qname != *child.qname() => {
                errs.push(Violation::new(
                    ValidateCode::ContainerTypeMismatch,
                    parent_type.clone(),
                    format!(
                        "container '{}' expects '{}', child is '{}'",
                        c.name,
                        c.qname,
                        child.qname()
                    ),
                ));
            }
            Some(_) => {}
        }
    }
}
