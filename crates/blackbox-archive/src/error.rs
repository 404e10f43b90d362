//! Error types for archive operations

use thiserror::Error;

/// Errors surfaced by the block file and archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Archive task has shut down")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ArchiveError::Io("disk full".to_string());
        assert!(format!("{}", err).contains("disk full"));

        let err = ArchiveError::Serialization("bad value".to_string());
        assert!(format!("{}", err).contains("Serialization"));

        assert!(format!("{}", ArchiveError::Closed).contains("shut down"));
    }
}
