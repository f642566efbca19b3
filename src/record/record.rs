//! Records: rows with identity
//!
//! A record is a document- or record-kind row: it carries a 64-bit
//! identifier and, for contained records, the parent identifier and
//! container name linking it into its document tree.

use crate::names::QName;
use crate::row::{AppContext, BuildErrors, Row, RowResult};

use super::id::RecordId;

/// A row with identity and tree linkage
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    row: Row,
}

impl Record {
    /// Wrap a row as a record
    pub fn new(row: Row) -> Self {
        Self { row }
    }

    /// The underlying row
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// The underlying row, mutably
    pub fn row_mut(&mut self) -> &mut Row {
        &mut self.row
    }

    /// Unwrap into the underlying row
    pub fn into_row(self) -> Row {
        self.row
    }

    /// The record's type
    pub fn qname(&self) -> &QName {
        self.row.qname()
    }

    /// Record identifier
    pub fn id(&self) -> RecordId {
        self.row.id()
    }

    /// Set the record identifier
    pub fn set_id(&mut self, id: RecordId) {
        self.row.set_id(id);
    }

    /// Parent record identifier
    pub fn parent(&self) -> RecordId {
        self.row.parent()
    }

    /// Set the parent record identifier
    pub fn set_parent(&mut self, parent: RecordId) {
        self.row.set_parent(parent);
    }

    /// Container name within the parent
    pub fn container(&self) -> &str {
        self.row.container()
    }

    /// Set the container name within the parent
    pub fn set_container(&mut self, container: impl Into<String>) {
        self.row.set_container(container);
    }

    /// Active flag
    pub fn is_active(&self) -> bool {
        self.row.is_active()
    }

    /// Set the active flag
    pub fn set_active(&mut self, active: bool) {
        self.row.set_active(active);
    }

    /// Surface collected field problems, see [`Row::build`]
    pub fn build(&self) -> Result<(), BuildErrors> {
        self.row.build()
    }

    /// Serialize the record
    pub fn store(&self, ctx: &dyn AppContext) -> RowResult<Vec<u8>> {
        crate::row::store_row(&self.row, ctx)
    }

    /// Decode a record from bytes produced by [`Record::store`]
    pub fn load(bytes: &[u8], ctx: &dyn AppContext) -> RowResult<Record> {
        Ok(Self::new(crate::row::load_row(bytes, ctx)?))
    }

    /// Redact user field values, keeping identity and linkage
    pub fn mask_values(&mut self) {
        self.row.mask_values();
    }

    /// Drop field values, releasing nested rows
    pub fn release(&mut self) {
        self.row.release();
    }
}

impl From<Row> for Record {
    fn from(row: Row) -> Self {
        Self::new(row)
    }
}
