//! Experiment Record - the durable row for one named experiment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Experiment Record represents one named A/B test.
///
/// Names are globally unique and compared exactly as given (case and
/// whitespace sensitive). Alternatives are stored alongside the record by
/// the backend and are deleted with it.
///
/// `generation` is random per record, so an experiment that is ended and
/// started again under the same name is distinguishable from its previous
/// incarnation in per-user ledger state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    name: String,
    created_at: DateTime<Utc>,
    generation: u64,
    conversion_name: Option<String>,
}

impl ExperimentRecord {
    /// Create a new experiment record with the current timestamp.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            generation: rand::random(),
            conversion_name: None,
        }
    }

    /// Create a builder for constructing an experiment record with optional fields.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ExperimentRecordBuilder {
        ExperimentRecordBuilder::new(name)
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the incarnation id of this experiment.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Get the conversion action this experiment listens to, if any.
    #[must_use]
    pub fn conversion_name(&self) -> Option<&str> {
        self.conversion_name.as_deref()
    }
}

/// Builder for `ExperimentRecord`.
#[derive(Debug)]
pub struct ExperimentRecordBuilder {
    name: String,
    created_at: DateTime<Utc>,
    generation: u64,
    conversion_name: Option<String>,
}

impl ExperimentRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            generation: rand::random(),
            conversion_name: None,
        }
    }

    /// Set the conversion action (e.g. `"purchase"`) that converts this experiment.
    #[must_use]
    pub fn conversion_name(mut self, conversion_name: impl Into<String>) -> Self {
        self.conversion_name = Some(conversion_name.into());
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set a fixed generation (useful for restoring stored records).
    #[must_use]
    pub const fn generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Build the `ExperimentRecord`.
    #[must_use]
    pub fn build(self) -> ExperimentRecord {
        ExperimentRecord {
            name: self.name,
            created_at: self.created_at,
            generation: self.generation,
            conversion_name: self.conversion_name,
        }
    }
}
