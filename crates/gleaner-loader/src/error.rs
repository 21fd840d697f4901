//! Error types for the load stage

use gleaner_domain::CheckpointError;
use gleaner_resolver::ResolverError;
use thiserror::Error;

/// Errors that can occur while loading documents
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Entity store error
    #[error("Store error: {0}")]
    Store(String),

    /// Entity resolution error
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// A record could not be mapped to an entity graph
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// A document was rolled back
    #[error("Document {path} failed at record {record}: {message}")]
    Document {
        /// Document path
        path: String,
        /// Index of the record being loaded (0 when the document itself failed)
        record: usize,
        /// Underlying error
        message: String,
    },

    /// Checkpoint invariant violated
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Checkpoint store failure
    #[error("Checkpoint store error: {0}")]
    CheckpointStore(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for LoaderError {
    fn from(e: serde_json::Error) -> Self {
        LoaderError::JsonParse(e.to_string())
    }
}

impl LoaderError {
    /// Wrap a store error
    pub(crate) fn store<E: std::fmt::Display>(e: E) -> Self {
        LoaderError::Store(e.to_string())
    }
}
