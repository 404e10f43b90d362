//! Error types for the logging facility

use thiserror::Error;

pub use blackbox_archive::ArchiveError;

/// Errors from building or operating a log store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing archive could not be opened or operated on.
    #[error("Log store archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// Top-level error for embedders that handle everything in one place.
#[derive(Debug, Error)]
pub enum BlackboxError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
