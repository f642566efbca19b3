//! Binary row codec subsystem for emberdb
//!
//! Maps typed field values onto a flat, versioned binary layout and back.
//! Rows are encoded as:
//!
//! ```text
//! +--------------------+
//! | Codec Version      | (u8)
//! +--------------------+
//! | Type Identifier    | (u16 LE, from the QName cache)
//! +--------------------+
//! | System Fields      | (conditional on the type kind)
//! +--------------------+
//! | User Field Buffer  | (u32 LE length prefix + buffer)
//! +--------------------+
//! ```
//!
//! Readers accept the current and the immediately prior codec version so
//! schemas can evolve (fields are matched positionally, not by stored
//! name) without rewriting stored data.

mod codec;
mod errors;
mod layout;
mod row;
#[cfg(test)]
pub(crate) mod testctx;
mod value;

use std::sync::Arc;

use crate::names::{ContainerId, NamesResult, QName, QNameId};
use crate::record::RecordId;
use crate::schema::{CommandDef, SchemaResult};
use crate::tokens::TokenVerifier;

pub use codec::{load_row, store_row, CODEC_VERSION_CURRENT, CODEC_VERSION_LEGACY};
pub(crate) use codec::{encode_row, Reader};
pub use errors::{BuildErrors, BuildIssue, DecodeError, FieldIssue, RowError, RowResult};
pub use layout::{sys_fields_for, LayoutCache, LayoutField, RowLayout, SysFields};
pub use row::{Row, MASKED_STRING};
pub use value::Value;

/// The prepared application-configuration surface the codecs consume.
///
/// Implemented by the application configuration; narrow enough that tests
/// can supply their own.
pub trait AppContext {
    /// Resolve a qualified name to its compact identifier
    fn qname_id(&self, name: &QName) -> NamesResult<QNameId>;

    /// Resolve a compact identifier back to its qualified name
    fn qname_by_id(&self, id: QNameId) -> NamesResult<QName>;

    /// Resolve a container name to its compact identifier
    fn container_id(&self, name: &str) -> NamesResult<ContainerId>;

    /// Resolve a compact identifier back to its container name
    fn container_by_id(&self, id: ContainerId) -> NamesResult<String>;

    /// The compiled layout of a declared type
    fn layout(&self, qname: &QName) -> SchemaResult<Arc<RowLayout>>;

    /// The token verifier consulted by verifiable fields, if configured
    fn verifier(&self) -> Option<Arc<dyn TokenVerifier>>;

    /// The registered command definition, if any
    fn command_def(&self, name: &QName) -> Option<CommandDef>;

    /// The fixed record id of a singleton type
    fn singleton_id(&self, qname: &QName) -> NamesResult<RecordId>;
}
