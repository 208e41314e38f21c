//! Error types for cache operations.

use std::path::PathBuf;

use kiln_common::SlotId;

/// Errors that can occur inside the cache subsystem.
///
/// Host-facing operations never surface these directly: they are logged and
/// degrade to a cache miss or a skipped save. The enum exists for internal
/// propagation between the index, entry store, and engine.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The cache index could not be parsed or is internally inconsistent.
    #[error("failed to parse cache index: {reason}")]
    IndexParse {
        /// Description of the parse failure.
        reason: String,
    },

    /// No entry file exists for the slot.
    #[error("no cache entry for slot {slot}")]
    EntryNotFound {
        /// The slot that was looked up.
        slot: SlotId,
    },

    /// An entry file is truncated, oversized, or otherwise malformed.
    #[error("corrupt cache entry {path}: {reason}")]
    CorruptEntry {
        /// The entry file path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A persisted format version does not match the current version.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The offending file.
        path: PathBuf,
        /// The expected format version.
        expected: u32,
        /// The version found on disk.
        actual: u32,
    },

    /// A value could not be encoded for storage.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

impl CacheError {
    /// Returns `true` if the error means the entry file should be treated as
    /// corrupt (and evicted) rather than as an environmental failure.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CacheError::CorruptEntry { .. } | CacheError::VersionMismatch { .. }
        )
    }
}

/// Reason a cached program could not be loaded.
///
/// Every variant is recoverable: the host falls back to compiling from
/// source. All variants except `Unsupported` and `NotFound` evict the entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The platform cannot retrieve or load program binaries.
    #[error("program binaries are not supported on this platform")]
    Unsupported,

    /// No cache entry exists for the key.
    #[error("no cached program")]
    NotFound,

    /// The stored stage fingerprints differ from the supplied ones.
    #[error("stage fingerprints do not match the cached program")]
    HashMismatch,

    /// The entry file could not be read or is malformed.
    #[error("cached program is unreadable: {0}")]
    Corrupt(String),

    /// The graphics driver refused the stored binary.
    #[error("platform rejected the cached binary: {0}")]
    PlatformRejected(String),
}

/// Errors that can occur when loading or validating a `kiln.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A required field is missing from the configuration.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}
