//! Record identifiers and sharded-path utilities.
//!
//! Stored intake records and conversation references live under sharded directories derived
//! from a UUID. Identifiers use a *canonical* representation: **32 lowercase hexadecimal
//! characters** (no hyphens), e.g. `550e8400e29b41d4a716446655440000`.
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, data is stored under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `data/records/patients/55/0e/550e8400e29b41d4a716446655440000/`
//!
//! This keeps any single directory from growing without bound as records accumulate.

mod record_id;

pub use record_id::RecordId;

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
