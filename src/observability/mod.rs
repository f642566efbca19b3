//! Observability subsystem for emberdb
//!
//! Structured JSON logging for engine milestones: configuration
//! preparation, identifier cache load/flush and event store/load.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No async or background threads
//! 4. Deterministic output

mod logger;

pub use logger::{Logger, Severity};
