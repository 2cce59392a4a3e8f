//! Error types for PTF parsing, serialization and configuration.

use thiserror::Error;

/// Errors that can occur while reading or writing PTF documents.
///
/// Malformed data lines are never an error: the tokenizer always recovers a
/// best-effort token list. Only an unsupported `FILE_TYPE` aborts a document.
#[derive(Debug, Error)]
pub enum PtfError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The document declared a `FILE_TYPE` other than `MULTI_PHYS_TABLE`.
    #[error("invalid file format: unsupported FILE_TYPE '{0}'")]
    UnsupportedFileType(String),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    ConfigError(#[from] serde_yaml::Error),
}

/// Convenience alias for results with [`PtfError`].
pub type Result<T> = std::result::Result<T, PtfError>;
