use std::error::Error;
use thiserror::Error;

/// Result alias for [`crate::dao::arena_store::ArenaStore`] calls.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure reported by an arena store backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the call; retrying may help.
    #[error("{backend} unavailable: {message}")]
    Unavailable {
        /// Which backend failed, for logs.
        backend: &'static str,
        /// What was being attempted.
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A stored document could not be mapped back to a domain value.
    #[error("stored record is invalid: {0}")]
    InvalidRecord(String),
}

impl StorageError {
    /// Wrap a backend failure.
    pub fn unavailable(
        backend: &'static str,
        message: String,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            backend,
            message,
            source: Box::new(source),
        }
    }

    /// Whether the same call could succeed later. Bad records never heal by retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}
