//! Durable store collaborator
//!
//! The backend owns experiment rows and their alternatives, including the
//! aggregate counters. It must provide a unique-name constraint,
//! all-or-nothing creation of an experiment with its alternatives, and
//! in-place counter increments.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{AlternativeRecord, Counter, Experiment, ExperimentRecord};
use crate::{Error, Result};

/// Durable storage for experiments and alternatives.
///
/// Transient failures surface as `Error::Store`; implementations do not retry.
pub trait ExperimentBackend: Send + Sync {
    /// Number of experiments with exactly this name (0 or 1).
    fn count_named(&self, name: &str) -> Result<usize>;

    /// Load an experiment with its alternatives.
    fn find_experiment(&self, name: &str) -> Result<Option<Experiment>>;

    /// Create an experiment and all its alternatives atomically.
    ///
    /// Fails with `Error::DuplicateExperiment` if the name is taken, in which
    /// case nothing is written.
    fn create_experiment(
        &self,
        record: ExperimentRecord,
        alternatives: Vec<AlternativeRecord>,
    ) -> Result<Experiment>;

    /// Add one to a counter on the alternative identified by `lookup`.
    fn increment(&self, name: &str, lookup: &str, counter: Counter) -> Result<()>;

    /// Sum a counter across an experiment's alternatives.
    fn sum(&self, name: &str, counter: Counter) -> Result<u64>;

    /// Delete the experiment's alternatives, then the experiment.
    ///
    /// Returns whether anything was deleted.
    fn delete_experiment(&self, name: &str) -> Result<bool>;

    /// Names of all experiments, sorted.
    fn experiment_names(&self) -> Result<Vec<String>>;

    /// Names of experiments created with this conversion name, sorted.
    fn experiments_converting_on(&self, conversion: &str) -> Result<Vec<String>>;
}

impl<B: ExperimentBackend + ?Sized> ExperimentBackend for Arc<B> {
    fn count_named(&self, name: &str) -> Result<usize> {
        (**self).count_named(name)
    }

    fn find_experiment(&self, name: &str) -> Result<Option<Experiment>> {
        (**self).find_experiment(name)
    }

    fn create_experiment(
        &self,
        record: ExperimentRecord,
        alternatives: Vec<AlternativeRecord>,
    ) -> Result<Experiment> {
        (**self).create_experiment(record, alternatives)
    }

    fn increment(&self, name: &str, lookup: &str, counter: Counter) -> Result<()> {
        (**self).increment(name, lookup, counter)
    }

    fn sum(&self, name: &str, counter: Counter) -> Result<u64> {
        (**self).sum(name, counter)
    }

    fn delete_experiment(&self, name: &str) -> Result<bool> {
        (**self).delete_experiment(name)
    }

    fn experiment_names(&self) -> Result<Vec<String>> {
        (**self).experiment_names()
    }

    fn experiments_converting_on(&self, conversion: &str) -> Result<Vec<String>> {
        (**self).experiments_converting_on(conversion)
    }
}

/// In-memory backend.
///
/// ## Design
///
/// Experiments live in a `DashMap` keyed by name, each holding its
/// alternatives in creation order. The map's entry API gives the unique-name
/// constraint, and an experiment becomes visible together with all of its
/// alternatives. Counter increments happen in place under the shard's write
/// lock, so concurrent increments are never lost.
#[derive(Debug, Default)]
pub struct MemoryExperimentStore {
    experiments: DashMap<String, Experiment>,
}

impl MemoryExperimentStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store holds no experiments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Number of experiments.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Number of alternatives across all experiments.
    #[must_use]
    pub fn alternative_count(&self) -> usize {
        self.experiments
            .iter()
            .map(|entry| entry.value().alternatives().len())
            .sum()
    }
}

impl ExperimentBackend for MemoryExperimentStore {
    fn count_named(&self, name: &str) -> Result<usize> {
        Ok(usize::from(self.experiments.contains_key(name)))
    }

    fn find_experiment(&self, name: &str) -> Result<Option<Experiment>> {
        Ok(self.experiments.get(name).map(|entry| entry.value().clone()))
    }

    fn create_experiment(
        &self,
        record: ExperimentRecord,
        alternatives: Vec<AlternativeRecord>,
    ) -> Result<Experiment> {
        for (i, alt) in alternatives.iter().enumerate() {
            if alternatives[..i].iter().any(|other| other.lookup() == alt.lookup()) {
                return Err(Error::InvalidAlternativeSpec(format!(
                    "alternative {} appears twice in experiment '{}'",
                    alt.content(),
                    record.name()
                )));
            }
        }

        match self.experiments.entry(record.name().to_string()) {
            Entry::Occupied(_) => Err(Error::DuplicateExperiment(record.name().to_string())),
            Entry::Vacant(vacant) => {
                let experiment = Experiment::new(record, alternatives);
                vacant.insert(experiment.clone());
                Ok(experiment)
            }
        }
    }

    fn increment(&self, name: &str, lookup: &str, counter: Counter) -> Result<()> {
        let mut experiment = self
            .experiments
            .get_mut(name)
            .ok_or_else(|| Error::ExperimentNotFound(name.to_string()))?;
        let alternative = experiment
            .alternatives_mut()
            .iter_mut()
            .find(|alt| alt.lookup() == lookup)
            .ok_or_else(|| {
                Error::Store(format!("experiment '{name}' has no alternative with lookup {lookup}"))
            })?;
        alternative.increment(counter);
        Ok(())
    }

    fn sum(&self, name: &str, counter: Counter) -> Result<u64> {
        self.experiments
            .get(name)
            .map(|entry| entry.value().sum(counter))
            .ok_or_else(|| Error::ExperimentNotFound(name.to_string()))
    }

    fn delete_experiment(&self, name: &str) -> Result<bool> {
        // Alternatives are owned by the experiment value and go with it
        Ok(self.experiments.remove(name).is_some())
    }

    fn experiment_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.experiments.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    fn experiments_converting_on(&self, conversion: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .experiments
            .iter()
            .filter(|e| e.value().record().conversion_name() == Some(conversion))
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
