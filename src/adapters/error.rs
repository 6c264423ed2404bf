//! Error type shared by the record store backends.

use std::path::PathBuf;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Schema mismatch in {location}: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        location: String,
        expected: String,
        found: String,
    },

    #[error("Corrupt record at row {row}: {reason}")]
    Corrupt { row: usize, reason: String },

    #[error("Record store lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the schema drift case, which needs operator attention
    /// rather than a retry.
    #[must_use]
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }
}
