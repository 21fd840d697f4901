//! Harvest error types

use gleaner_domain::CheckpointError;
use thiserror::Error;

/// Errors that can occur while harvesting
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Timeout, connection failure, 429/5xx or malformed body; worth retrying
    #[error("Transient error: {0}")]
    Transient(String),

    /// Explicit provider error or non-retryable status
    #[error("Provider error: {0}")]
    Provider(String),

    /// Every retry of a call failed with a transient error
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made, including the first
        attempts: u32,
        /// Last transient error
        last: String,
    },

    /// A bulk job did not finish within its maximum wait
    #[error("Job {job_id} not finished after {waited_secs}s")]
    JobTimeout {
        /// Provider job id
        job_id: String,
        /// Seconds waited since submission
        waited_secs: i64,
    },

    /// A bulk job state machine received an event its state does not accept
    #[error("Invalid job transition: {event} in state {state}")]
    InvalidTransition {
        /// State name
        state: &'static str,
        /// Event name
        event: &'static str,
    },

    /// Checkpoint invariant violated
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Checkpoint store failure
    #[error("Checkpoint store error: {0}")]
    CheckpointStore(String),

    /// Raw sink failure
    #[error("Sink error: {0}")]
    Sink(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Whether the failed call should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, HarvestError::Transient(_))
    }

    /// A response body that does not have the expected shape
    pub fn malformed(what: impl std::fmt::Display) -> Self {
        HarvestError::Transient(format!("malformed response: {}", what))
    }
}
