//! Error types for portrait search

use thiserror::Error;

/// Result type alias for portrait search operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while indexing, retrieving or evaluating portraits
#[derive(Error, Debug)]
pub enum Error {
    /// Setup mistake that retrying cannot fix (unknown strategy, bad dimensionality, missing dataset)
    #[error("configuration error: {0}")]
    Config(String),

    /// A dataset entry violates one of the dataset invariants
    #[error("invalid dataset entry '{entry}', query '{query}', portrait '{portrait}': {reason}")]
    Dataset {
        entry: String,
        query: String,
        portrait: String,
        reason: String,
    },

    /// Failed to load or run the embedding model
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Failed to store or retrieve from a backing store
    #[error("store error: {0}")]
    Store(String),

    /// Portrait or embedding not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input provided
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        Error::Store(err.to_string())
    }
}
