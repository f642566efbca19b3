//! Records and element trees for emberdb
//!
//! Rows acquire identity here: a record is a row with a 64-bit identifier
//! and tree linkage, and an element tree composes rows into the document
//! hierarchies used for command arguments and query results.
//!
//! # Design Principles
//!
//! - Identifiers partition into raw, singleton and bucketed storage ranges
//! - Trees live in one vector; links are indices, never pointers
//! - A record or tree is owned by one in-flight operation at a time

mod element;
mod id;
mod record;

pub use element::{ElementNode, ElementTree, MAX_TREE_NODES};
pub use id::{
    RecordId, FIRST_SINGLETON_ID, FIRST_STORAGE_ID, MAX_RAW_RECORD_ID, MAX_SINGLETON_ID,
    SEQUENCE_BITS,
};
pub use record::Record;
