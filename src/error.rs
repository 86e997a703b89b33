//! Error types for cache operations
//!
//! Misses are never errors: an absent, expired or unreadable entry is reported
//! as `None`. The variants below cover the failures a caller must see.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Generic file-system error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Compression or decompression failure in the cold tier
    #[error("Compression error: {0}")]
    CompressionError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Cache root could not be prepared
    #[error("Failed to initialize cache root {path:?}: {reason}")]
    InitializationError { path: PathBuf, reason: String },

    /// Atomic write of an entry could not complete
    #[error("Failed to write cache entry {key}: {source}")]
    WriteError {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Key is malformed or not usable as a file name
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// A single entry exceeds the tier budget even with the tier emptied
    #[error("Entry of {size_bytes} bytes exceeds tier budget of {max_bytes} bytes")]
    EntryTooLarge { size_bytes: u64, max_bytes: u64 },
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::ConfigError("max_entries must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: max_entries must be greater than 0"
        );

        let too_large = CacheError::EntryTooLarge {
            size_bytes: 2048,
            max_bytes: 1024,
        };
        assert!(too_large.to_string().contains("2048 bytes"));

        let write = CacheError::WriteError {
            key: "TAN_analysis_0123456789abcdef".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(write.to_string().contains("TAN_analysis_0123456789abcdef"));
    }

    #[test]
    fn test_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: CacheError = io.into();
        assert!(matches!(error, CacheError::IoError(_)));
    }
}
