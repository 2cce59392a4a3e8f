//! Error types for PTF storage operations.
//!
//! Provides a unified error type covering database access, identifier
//! validation, schema reconciliation and document format failures.

use thiserror::Error;

/// Errors that can occur while importing into or exporting from SQLite.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Table or column name rejected by the identifier allow-list.
    #[error("invalid identifier '{0}': must be 1-128 characters of [A-Za-z0-9_$#.-] and not reserved")]
    InvalidIdentifier(String),

    /// Schema reconciliation could not be applied.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// Requested table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// The PTF document itself was rejected.
    #[error("format error: {0}")]
    FormatError(#[from] ptf_core::PtfError),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Convenience alias for results with [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
