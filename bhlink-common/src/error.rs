//! Common error types for BHLink

use thiserror::Error;

/// Common result type for BHLink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across BHLink crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ambiguous knowledge-base linkage for a bibliography title
    #[error("Ambiguous publication link for title {title_id}: {candidate_count} candidate(s)")]
    AmbiguousLink {
        title_id: String,
        candidate_count: usize,
    },

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
