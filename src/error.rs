//! Error types for abingo
//!
//! Malformed alternative specs are fatal to the calling request. Store and
//! cache failures are surfaced as-is; the caller decides whether to degrade
//! to a default alternative.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// abingo error types
#[derive(Error, Debug)]
pub enum Error {
    /// The alternatives were given in a shape that cannot be turned into variants
    #[error("Unsupported alternative spec: {0}\nUse a list, a positive count, an integer range, or a map of content to integer weight")]
    UnsupportedAlternativeSpec(String),

    /// The alternatives have the right shape but bad contents (non-integer weight, empty set)
    #[error("Invalid alternative spec: {0}")]
    InvalidAlternativeSpec(String),

    /// Statistics were requested on an experiment without alternatives
    #[error("Experiment '{0}' has no alternatives")]
    NoAlternatives(String),

    /// An experiment with this name already exists (lost creation race)
    #[error("Experiment '{0}' already exists")]
    DuplicateExperiment(String),

    /// The experiment is not known to the durable store
    #[error("Experiment '{0}' not found")]
    ExperimentNotFound(String),

    /// Transient cache failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Transient durable store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization of cache values or alternative content
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
