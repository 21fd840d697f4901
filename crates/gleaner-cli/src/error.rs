//! Error types for the CLI application.

use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Store error: {0}")]
    Store(#[from] gleaner_store::StoreError),

    /// Harvest error
    #[error("Harvest error: {0}")]
    Harvest(#[from] gleaner_harvest::HarvestError),

    /// Load error
    #[error("Load error: {0}")]
    Loader(#[from] gleaner_loader::LoaderError),

    /// Resolver setup error
    #[error("Resolver error: {0}")]
    Resolver(#[from] gleaner_resolver::ResolverError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The command finished but left failed units or documents behind
    #[error("Incomplete: {0}")]
    Incomplete(String),
}
