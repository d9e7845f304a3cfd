//! Error types for the imep service.

use imep_search::SearchError;

/// Top-level error type for the search service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Search cascade error.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP server error.
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_errors_display_unchanged() {
        let err = ServiceError::from(SearchError::ScorerUnavailable("ngram timed out".into()));
        assert_eq!(err.to_string(), "scorer unavailable: ngram timed out");
    }

    #[test]
    fn server_error_display() {
        let err = ServiceError::Server("bind failed".into());
        assert_eq!(err.to_string(), "server error: bind failed");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ServiceError = io.into();
        assert!(err.to_string().starts_with("I/O error"));
    }
}
