//! Record identifiers
//!
//! A record id is a 64-bit value in one of three ranges:
//!
//! ```text
//! 0                          null
//! 1        ..= 0xFFFF        raw: client-assigned, scoped to one event
//! 0x10000  ..= 0x1FFFF       singleton instances, fixed per type
//! >= 1 << 22                 storage: (bucket << 22) | sequence
//! ```
//!
//! Raw identifiers are resolved to storage identifiers at commit time. The
//! bucket/sequence split keeps records of one allocation bucket adjacent in
//! the storage key space.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest raw (client-assigned, event-scoped) identifier
pub const MAX_RAW_RECORD_ID: u64 = 0xFFFF;
/// First identifier reserved for singleton instances
pub const FIRST_SINGLETON_ID: u64 = 0x1_0000;
/// Last identifier reserved for singleton instances
pub const MAX_SINGLETON_ID: u64 = 0x1_FFFF;
/// Width of the sequence part of a storage identifier
pub const SEQUENCE_BITS: u32 = 22;
/// First regular storage identifier (bucket 1, sequence 0)
pub const FIRST_STORAGE_ID: u64 = 1 << SEQUENCE_BITS;

const SEQUENCE_MASK: u64 = FIRST_STORAGE_ID - 1;

/// 64-bit record identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RecordId(u64);

impl RecordId {
    /// The null identifier
    pub const NULL: RecordId = RecordId(0);

    /// Wrap a 64-bit value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// A raw identifier, as assigned by a client within one event
    pub fn raw(n: u16) -> Self {
        Self(u64::from(n))
    }

    /// Compose a storage identifier from its bucket and sequence parts.
    /// The sequence must fit the sequence width; the bucket must be nonzero
    /// for the result to land in the storage range.
    pub fn from_parts(bucket: u64, sequence: u64) -> Self {
        Self((bucket << SEQUENCE_BITS) | (sequence & SEQUENCE_MASK))
    }

    /// The underlying 64-bit value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true for the null identifier
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns true for a raw (event-scoped, not yet committed) identifier
    pub fn is_raw(self) -> bool {
        self.0 >= 1 && self.0 <= MAX_RAW_RECORD_ID
    }

    /// Returns true for an identifier in the singleton range
    pub fn is_singleton(self) -> bool {
        self.0 >= FIRST_SINGLETON_ID && self.0 <= MAX_SINGLETON_ID
    }

    /// Returns true for a regular storage identifier
    pub fn is_storage(self) -> bool {
        self.0 >= FIRST_STORAGE_ID
    }

    /// High part of a storage identifier
    pub fn bucket(self) -> u64 {
        self.0 >> SEQUENCE_BITS
    }

    /// Low part of a storage identifier
    pub fn sequence(self) -> u64 {
        self.0 & SEQUENCE_MASK
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
