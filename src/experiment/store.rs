//! Experiment Store - cached existence and alternative lookups over a backend
//!
//! This is the layer the facade and ledger talk to. It combines the durable
//! [`ExperimentBackend`] with the [`Cache`]:
//!
//! - `exists` caches positive answers only. A missing experiment is
//!   re-checked against the backend on every call so a concurrent creation
//!   is never hidden behind a cached "no".
//! - `alternatives_for` is a read-through cache of the weight-flattened
//!   alternative list, kept until evicted.
//! - `start_experiment` is find-or-create by name.
//! - `generation` identifies the live incarnation of a name; per-user
//!   ledger state is tagged with it so nothing survives `end_experiment`.

use serde_json::Value;
use tracing::{debug, info};

use super::{AlternativeRecord, Experiment, ExperimentBackend, ExperimentRecord};
use crate::alternatives::{self, AlternativeSpec, WeightedAlternative};
use crate::cache::{Cache, CacheExt, CacheKey};
use crate::{Error, Result};

/// Cached view over an experiment backend.
///
/// Cheap to construct; it only borrows the backend and cache.
pub struct ExperimentStore<'a, B: ?Sized, C: ?Sized> {
    backend: &'a B,
    cache: &'a C,
    key_prefix: &'a str,
    cache_alternatives: bool,
}

impl<B: ?Sized, C: ?Sized> Clone for ExperimentStore<'_, B, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: ?Sized, C: ?Sized> Copy for ExperimentStore<'_, B, C> {}

impl<'a, B, C> ExperimentStore<'a, B, C>
where
    B: ExperimentBackend + ?Sized,
    C: Cache + ?Sized,
{
    /// Create a store view. `key_prefix` namespaces every cache key.
    #[must_use]
    pub const fn new(backend: &'a B, cache: &'a C, key_prefix: &'a str) -> Self {
        Self {
            backend,
            cache,
            key_prefix,
            cache_alternatives: true,
        }
    }

    /// Enable or disable caching of flattened alternative lists.
    #[must_use]
    pub const fn cache_alternatives(mut self, enabled: bool) -> Self {
        self.cache_alternatives = enabled;
        self
    }

    /// The durable backend.
    #[must_use]
    pub const fn backend(&self) -> &'a B {
        self.backend
    }

    /// The cache.
    #[must_use]
    pub const fn cache(&self) -> &'a C {
        self.cache
    }

    /// Render a cache key in this store's namespace.
    #[must_use]
    pub fn key(&self, key: &CacheKey<'_>) -> String {
        key.render(self.key_prefix)
    }

    /// Whether an experiment with this exact name exists.
    ///
    /// # Errors
    ///
    /// Propagates cache and backend failures.
    pub fn exists(&self, name: &str) -> Result<bool> {
        let key = self.key(&CacheKey::Exists(name));
        if self.cache.exists(&key)? {
            return Ok(true);
        }
        let found = self.backend.count_named(name)? > 0;
        if found {
            self.cache.write_json(&key, &true)?;
        }
        Ok(found)
    }

    /// Generation of the live experiment with this name, if any.
    ///
    /// Cached like `exists`: only a found generation is written back.
    ///
    /// # Errors
    ///
    /// Propagates cache and backend failures.
    pub fn generation(&self, name: &str) -> Result<Option<u64>> {
        let key = self.key(&CacheKey::Generation(name));
        if let Some(generation) = self.cache.read_json::<u64>(&key)? {
            return Ok(Some(generation));
        }
        let generation = self
            .backend
            .find_experiment(name)?
            .map(|experiment| experiment.record().generation());
        if let Some(generation) = generation {
            self.cache.write_json(&key, &generation)?;
        }
        Ok(generation)
    }

    /// Weight-flattened alternatives for an experiment.
    ///
    /// On a cache miss the persisted alternatives are loaded and expanded so
    /// each content appears `weight` times. If the experiment is not stored,
    /// `fallback` is parsed instead.
    ///
    /// # Errors
    ///
    /// - `Error::ExperimentNotFound` if the experiment is not stored and no fallback is given
    /// - `Error::NoAlternatives` if the stored experiment has no alternatives
    /// - parser errors from `fallback`, and cache/backend failures
    pub fn alternatives_for(
        &self,
        name: &str,
        fallback: Option<&AlternativeSpec>,
    ) -> Result<Vec<Value>> {
        let key = self.key(&CacheKey::Alternatives(name));
        if self.cache_alternatives {
            if let Some(cached) = self.cache.read_json::<Vec<Value>>(&key)? {
                return Ok(cached);
            }
        }

        debug!(experiment = name, "alternatives cache miss");
        let flattened = match self.backend.find_experiment(name)? {
            Some(experiment) => {
                let flattened = alternatives::flatten(&experiment.weighted());
                if flattened.is_empty() {
                    return Err(Error::NoAlternatives(name.to_string()));
                }
                flattened
            }
            None => match fallback {
                Some(spec) => alternatives::parse_flat(spec)?,
                None => return Err(Error::ExperimentNotFound(name.to_string())),
            },
        };

        if self.cache_alternatives {
            self.cache.write_json(&key, &flattened)?;
        }
        Ok(flattened)
    }

    /// Find or create an experiment with the given alternatives.
    ///
    /// When the name is already taken (including losing a creation race)
    /// the existing experiment is returned and `parsed` is ignored.
    ///
    /// # Errors
    ///
    /// - `Error::NoAlternatives` if `parsed` is empty
    /// - cache/backend failures other than the duplicate-name rejection
    pub fn start_experiment(
        &self,
        name: &str,
        parsed: &[WeightedAlternative],
        conversion_name: Option<&str>,
    ) -> Result<Experiment> {
        if parsed.is_empty() {
            return Err(Error::NoAlternatives(name.to_string()));
        }

        let mut record = ExperimentRecord::builder(name);
        if let Some(conversion) = conversion_name {
            record = record.conversion_name(conversion);
        }
        let alternatives = AlternativeRecord::from_parsed(name, parsed);

        let experiment = match self.backend.create_experiment(record.build(), alternatives) {
            Ok(experiment) => {
                info!(
                    experiment = name,
                    alternatives = experiment.alternatives().len(),
                    "experiment started"
                );
                self.cache.delete(&self.key(&CacheKey::Alternatives(name)))?;
                experiment
            }
            Err(Error::DuplicateExperiment(_)) => {
                debug!(experiment = name, "experiment already exists, using stored alternatives");
                self.backend
                    .find_experiment(name)?
                    .ok_or_else(|| Error::ExperimentNotFound(name.to_string()))?
            }
            Err(e) => return Err(e),
        };

        self.cache.write_json(&self.key(&CacheKey::Exists(name)), &true)?;
        self.cache.write_json(
            &self.key(&CacheKey::Generation(name)),
            &experiment.record().generation(),
        )?;
        Ok(experiment)
    }

    /// Delete an experiment and its alternatives, dropping cached lookups.
    ///
    /// Per-user entries tagged with the old generation stop matching, so a
    /// restarted experiment counts returning users afresh.
    ///
    /// Returns whether the experiment existed.
    ///
    /// # Errors
    ///
    /// Propagates cache and backend failures.
    pub fn end_experiment(&self, name: &str) -> Result<bool> {
        let deleted = self.backend.delete_experiment(name)?;
        self.cache.delete(&self.key(&CacheKey::Exists(name)))?;
        self.cache.delete(&self.key(&CacheKey::Generation(name)))?;
        self.cache.delete(&self.key(&CacheKey::Alternatives(name)))?;
        if deleted {
            info!(experiment = name, "experiment ended");
        }
        Ok(deleted)
    }
}
