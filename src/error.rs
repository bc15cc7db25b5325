//! Error types for langpref.
//!
//! The variants follow the storage failure taxonomy: a missing backend is
//! expected and degrades quietly, a failing backend is reported, corrupt
//! payloads are detected by explicit validators, and invalid input is
//! rejected before it reaches storage.

use std::io;
use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (invalid config file, out-of-range values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A storage backend is not present in this environment.
    #[error("Storage backend '{backend}' is unavailable")]
    BackendUnavailable {
        /// Backend name.
        backend: &'static str,
    },

    /// A storage backend rejected a read or write.
    #[error("Storage backend '{backend}' failed: {message}")]
    Backend {
        /// Backend name.
        backend: &'static str,
        /// Failure description.
        message: String,
    },

    /// A write would exceed the backend's size limit.
    #[error("Storage backend '{backend}' quota exceeded ({needed} bytes needed, limit {limit})")]
    QuotaExceeded {
        /// Backend name.
        backend: &'static str,
        /// Bytes the write would occupy.
        needed: usize,
        /// Backend limit in bytes.
        limit: usize,
    },

    /// Stored data could not be parsed or failed shape validation.
    #[error("Corrupt data under '{key}': {reason}")]
    CorruptData {
        /// Storage key holding the payload.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Input failed allow-list validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Locale code is not in the supported set.
    #[error("Unsupported locale '{0}'")]
    UnsupportedLocale(String),

    /// An export bundle was rejected on import.
    #[error("Import rejected: {0}")]
    Import(#[from] ImportError),

    /// Named backup snapshot does not exist.
    #[error("Backup '{0}' not found")]
    BackupNotFound(String),

    /// Invalid command-line argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// General/unspecified error.
    #[error("{0}")]
    Other(String),
}

/// Reasons an export bundle is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    /// Bundle version is not one this build understands.
    #[error("unsupported bundle version '{found}' (expected '{expected}')")]
    VersionMismatch {
        /// Version carried by the bundle.
        found: String,
        /// Version this build writes.
        expected: &'static str,
    },

    /// Integrity checksum does not match the bundle contents.
    #[error("checksum mismatch (bundle says {expected}, contents hash to {actual})")]
    ChecksumMismatch {
        /// Checksum recorded in the bundle metadata.
        expected: String,
        /// Checksum recomputed from the contents.
        actual: String,
    },

    /// A history import was requested but the bundle carries none.
    #[error("bundle contains no history")]
    MissingHistory,

    /// The bundle parsed but its contents violate a shape invariant.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// The bundle is not valid JSON for the bundle schema.
    #[error("unreadable bundle: {0}")]
    Unreadable(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the process exit code for this error type.
    ///
    /// - 1: General error
    /// - 2: Invalid input, argument or configuration
    /// - 5: Resource not found
    /// - 6: Import rejected
    /// - 10: Storage or IO failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_)
            | Error::InvalidInput(_)
            | Error::InvalidArgument(_)
            | Error::UnsupportedLocale(_) => 2,

            Error::BackupNotFound(_) => 5,

            Error::Import(_) | Error::CorruptData { .. } => 6,

            Error::BackendUnavailable { .. }
            | Error::Backend { .. }
            | Error::QuotaExceeded { .. }
            | Error::Io(_) => 10,

            Error::Json(_) | Error::Yaml(_) | Error::Other(_) => 1,
        }
    }

    /// True for failures that mean "nothing usable is stored here" rather
    /// than "the store broke": reads treat these as absent.
    pub fn is_absent_like(&self) -> bool {
        matches!(self, Error::BackendUnavailable { .. } | Error::CorruptData { .. })
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a backend failure.
    pub fn backend(backend: &'static str, msg: impl Into<String>) -> Self {
        Error::Backend { backend, message: msg.into() }
    }

    /// Create a corrupt-data error.
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CorruptData { key: key.into(), reason: reason.into() }
    }

    /// Create a general error.
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}
