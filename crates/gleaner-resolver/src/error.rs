//! Resolver error types

use thiserror::Error;

/// Errors that can occur during entity resolution
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Store error during resolution
    #[error("Store error: {0}")]
    Store(String),

    /// Entity type not declared by the store
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// A configured natural key does not match any unique constraint
    #[error("Natural key {key:?} of '{entity_type}' is not a unique constraint of the store")]
    ContractViolation {
        /// Entity type
        entity_type: String,
        /// Offending key fields
        key: Vec<String>,
    },

    /// A reference used a natural key that was never registered
    #[error("Natural key {key:?} is not registered for '{entity_type}'")]
    UnregisteredKey {
        /// Entity type
        entity_type: String,
        /// Offending key fields
        key: Vec<String>,
    },

    /// Insert hit a unique constraint but no existing row could be found
    #[error("Insert of '{0}' collided with a unique constraint and re-resolution found nothing")]
    InsertRace(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ResolverError {
    /// Wrap a store error
    pub(crate) fn store<E: std::fmt::Display>(e: E) -> Self {
        ResolverError::Store(e.to_string())
    }
}
