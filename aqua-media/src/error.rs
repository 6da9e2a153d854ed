/// Errors from media storage providers.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot reach storage provider: {0}")]
    Connection(String),

    #[error("Storage provider returned HTTP {0}: {1}")]
    Http(u16, String),

    #[error("Invalid response from storage provider: {0}")]
    InvalidResponse(String),

    #[error("Cannot derive a resource identifier from URL: {0}")]
    InvalidUrl(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Transient failures worth another attempt: transport errors and
    /// provider-side 5xx. Client errors and parse failures repeat
    /// identically and are not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Connection(_) | StorageError::Http(500..=599, _)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StorageError::Connection("refused".into()).is_retryable());
        assert!(StorageError::Http(503, "busy".into()).is_retryable());
        assert!(!StorageError::Http(401, "bad key".into()).is_retryable());
        assert!(!StorageError::InvalidUrl("x".into()).is_retryable());
    }
}
