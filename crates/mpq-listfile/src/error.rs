//! Error types for listfile operations

use thiserror::Error;

/// Listfile operation result type
pub type ListfileResult<T> = Result<T, ListfileError>;

/// Errors produced while reading, assigning, enumerating or persisting
/// listfile names
#[derive(Debug, Error)]
pub enum ListfileError {
    /// A page buffer or scratch list could not be allocated
    #[error("Not enough memory")]
    NotEnoughMemory,

    /// The name source has no content
    #[error("Name source is empty")]
    EmptySource,

    /// The requested stream or local file does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// The name source could not be turned into a listfile cache
    #[error("File corrupt: {0}")]
    FileCorrupt(String),

    /// No index entry references the given name
    #[error("Name not present in any archive index: {0}")]
    CanNotComplete(String),

    /// Enumeration reached the end of the listfile
    #[error("No more files")]
    NoMoreFiles,

    /// Stream exists and replacement was not requested
    #[error("File already exists: {0}")]
    AlreadyExists(String),

    /// Written byte count differs from the size declared at create time
    #[error("Stream size mismatch: declared {expected} bytes, wrote {actual} bytes")]
    SizeMismatch {
        /// Size declared when the stream was created
        expected: u64,
        /// Number of bytes actually written
        actual: u64,
    },

    /// No free slot left in the archive hash table
    #[error("Hash table is full")]
    HashTableFull,

    /// Wildcard mask could not be compiled
    #[error("Invalid wildcard mask '{mask}': {reason}")]
    InvalidMask {
        /// The mask as supplied
        mask: String,
        /// Compiler diagnostic
        reason: String,
    },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ListfileError {
    /// Check if ingestion should skip past this error instead of stopping
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::EmptySource
                | Self::FileCorrupt(_)
                | Self::CanNotComplete(_)
                | Self::NoMoreFiles
        )
    }

    /// Check if this error means the stream does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<std::collections::TryReserveError> for ListfileError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::NotEnoughMemory
    }
}
