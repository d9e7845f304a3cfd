//! Error types for the imep-search crate.
//!
//! Messages are stable strings suitable for display to users. Query text
//! never appears in a [`SearchError::ScorerUnavailable`] message.

/// Errors that can occur while answering a search request.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The query was empty or contained no words after splitting.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The language-model scorer could not be run, exited abnormally,
    /// timed out, or produced output that could not be parsed.
    #[error("scorer unavailable: {0}")]
    ScorerUnavailable(String),

    /// Invalid configuration or unusable corpus / noise-phrase files.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error while writing or reading request artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Returns `true` if this error was caused by the caller's input rather
    /// than by the system.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidQuery(_))
    }
}

/// Convenience type alias for imep-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
