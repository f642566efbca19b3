//! Validation subsystem for emberdb
//!
//! Walks built structures (element trees, events, CUD sets) enforcing the
//! declared schema: occurs bounds, required fields, referential integrity
//! and identifier uniqueness.
//!
//! # Design Principles
//!
//! - One validator per declared type, built once at preparation
//! - Every violation found in one pass is reported, never just the first
//! - Violations carry numeric category codes for branching without string
//!   matching
//! - Validation is read-only and deterministic

mod codes;
mod validator;

pub use codes::{ValidateCode, ValidateErrors, Violation};
pub use validator::Validators;
