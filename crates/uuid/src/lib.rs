//! Identifier and sharded-path utilities.
//!
//! Every stored entity (account, patient, outreach event, payment) lives in a directory derived
//! from its identifier. To keep that derivation deterministic, identifiers use a *canonical*
//! form: **32 lowercase hexadecimal characters** with no hyphens.
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, data is stored under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `chs_data/patients/55/0e/550e8400e29b41d4a716446655440000/`
//!
//! The two shard levels keep any single directory from growing without bound.
//!
//! Encounters use a [`TimestampUuid`] instead, so that file names sort in the order the
//! encounters were recorded.

mod service;

pub use service::{ShardableUuid, TimestampUuid, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
