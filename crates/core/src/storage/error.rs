//! Storage error types.

use thiserror::Error;

use crate::scheduler::SchedulerError;

/// Boxed source error from an object-storage SDK.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object or bucket not found.
    #[error("not found: {key}")]
    NotFound {
        /// Key or bucket name that was not found.
        key: String,
    },

    /// At least one object of a batch delete was not confirmed as deleted.
    #[error(
        "failed to delete {} object(s) from bucket '{bucket}': {}",
        .failed_keys.len(),
        .failed_keys.join(", ")
    )]
    BatchDelete {
        /// Bucket the batch was issued against.
        bucket: String,
        /// Every key whose deletion was not confirmed.
        failed_keys: Vec<String>,
    },

    /// Backend request failed (network, throttling, access, ...).
    #[error("storage backend error: {message}")]
    Backend {
        /// Message with the full error context of the backend.
        message: String,
        /// Underlying SDK error.
        #[source]
        source: BoxError,
    },

    /// Fetching a remote source failed.
    #[error("failed to fetch remote source: {0}")]
    Fetch(#[from] reqwest::Error),

    /// Local file access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Object content could not be decoded with the requested encoding.
    #[error("object '{key}' is not valid {encoding}")]
    Encoding {
        /// Object key.
        key: String,
        /// Requested encoding.
        encoding: &'static str,
    },

    /// Storage configuration error.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// Operation not supported by the selected backend.
    #[error("operation not supported by storage backend: {0}")]
    Unsupported(String),

    /// The storage facade was disposed.
    #[error("storage has been disposed")]
    Disposed,

    /// The scheduled operation did not complete.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl StorageError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an unsupported operation error.
    #[must_use]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a backend error from an SDK error and its rendered context.
    #[must_use]
    pub fn backend(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Returns true if this error means the object or bucket does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<opendal::Error> for StorageError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::NotFound {
                key: err.to_string(),
            },
            opendal::ErrorKind::Unsupported => Self::Unsupported(err.to_string()),
            _ => Self::backend(err.to_string(), err),
        }
    }
}
