//! Key-value storage collaborator for emberdb
//!
//! The engine assumes an externally supplied ordered key-value backend and
//! consumes it through the narrow [`KvStore`] trait: point gets, ordered
//! prefix reads with a per-cell callback and atomic batched puts. Only the
//! identifier caches and the versions view touch this interface.
//!
//! # Design Principles
//!
//! - The backend is opaque; keys are a partition-key / clustering-column pair
//! - All system records are versioned through the versions view
//! - Storage failures propagate immediately, they are never aggregated

mod errors;
mod kv;
mod versions;

pub use errors::{Severity, StorageError, StorageErrorCode, StorageResult};
pub use kv::{KvPut, KvStore, MemStorage};
pub use versions::{
    view_pkey, VersionsView, ViewId, ViewVersion, CONTAINERS_VIEW, QNAMES_VIEW, SINGLETONS_VIEW,
    VERSIONS_VIEW, VERSIONS_VIEW_VERSION,
};
