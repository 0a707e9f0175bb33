use thiserror::Error;

/// Top-level error type for the crate.
///
/// Policy outcomes (rate-limited, banned, invalid session) are never errors;
/// they are communicated through return values. Errors here are reserved for
/// the storage seam, and the services deliberately swallow them at the point
/// of use (see [`crate::store`]) so that a broken store degrades protection
/// rather than blocking the user.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let io_error = Error::Storage(StorageError::Io("disk full".to_string()));
        assert_eq!(io_error.to_string(), "Storage error: I/O error: disk full");

        let ser_error = Error::Storage(StorageError::Serialization("bad json".to_string()));
        assert_eq!(
            ser_error.to_string(),
            "Storage error: Serialization error: bad json"
        );
    }

    #[test]
    fn test_error_from_conversion() {
        let storage_error = StorageError::Backend("unavailable".to_string());
        let error: Error = storage_error.into();
        assert!(matches!(error, Error::Storage(StorageError::Backend(_))));
    }
}
