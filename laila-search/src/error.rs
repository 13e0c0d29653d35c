//! Error types for the laila-search crate.
//!
//! Messages are stable strings. Queries never appear in them.

/// Errors that can occur while looking up a video.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The results page did not arrive in time.
    #[error("search timed out: {0}")]
    Timeout(String),

    /// The HTTP request for the results page failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The query or results link could not be built.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for laila-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
