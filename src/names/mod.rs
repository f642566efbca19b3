//! Identifier cache subsystem for emberdb
//!
//! Compresses qualified type names, container names and singleton-instance
//! identities into small numeric codes used inside every binary row, and
//! persists the tables through the key-value collaborator.
//!
//! # Design Principles
//!
//! - Bijective live mapping per application lifetime
//! - Monotone allocation above a compile-time system range
//! - Rename tombstones the old name, the identifier survives
//! - Populated during the single-writer preparation phase; read-mostly after

mod cache;
mod errors;
mod qname;

pub use cache::{
    ContainerCache, ContainerId, QNameCache, QNameId, SingletonCache, CONTAINERS_VIEW_VERSION,
    CUD_COMMAND_QNAME_ID, ERROR_QNAME_ID, FIRST_USER_CONTAINER_ID, FIRST_USER_QNAME_ID,
    NULL_CONTAINER_ID, NULL_QNAME_ID, QNAMES_VIEW_VERSION, SINGLETONS_VIEW_VERSION,
};
pub use errors::{NamesError, NamesErrorCode, NamesResult, Severity};
pub use qname::{sys, QName, QNAME_SEPARATOR};
