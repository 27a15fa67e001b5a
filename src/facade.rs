//! The `Abingo` facade: `test`, `flip` and `bingo`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alternatives::{self, AlternativeSpec};
use crate::bucket;
use crate::cache::{Cache, MemoryCache};
use crate::config::AbingoConfig;
use crate::experiment::{Experiment, ExperimentBackend, ExperimentStore, MemoryExperimentStore};
use crate::identity::{Context, Identity};
use crate::ledger::{BingoOptions, BingoTarget, ConversionRecord, Ledger};
use crate::{Error, Result};

/// Options for [`Abingo::test`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestOptions {
    /// Count the user again on every call, not just the first.
    pub multiple_participation: bool,
    /// Conversion action (e.g. `"purchase"`) that converts this experiment.
    pub conversion: Option<String>,
}

impl TestOptions {
    /// Count every participation.
    #[must_use]
    pub const fn multiple_participation(mut self) -> Self {
        self.multiple_participation = true;
        self
    }

    /// Convert this experiment when `bingo(conversion)` is called.
    #[must_use]
    pub fn conversion(mut self, conversion: impl Into<String>) -> Self {
        self.conversion = Some(conversion.into());
        self
    }
}

/// A/B testing entry point.
///
/// Owns the durable backend, the cache, and the configuration. All per-user
/// state comes in through a [`Context`].
///
/// # Example
///
/// ```rust
/// use abingo::{Abingo, BingoOptions, TestOptions};
///
/// # fn main() -> abingo::Result<()> {
/// let abingo = Abingo::in_memory();
/// let ctx = abingo.context("user-42");
///
/// let color = abingo.test(&ctx, "button_color", ["red", "green"], &TestOptions::default())?;
/// assert!(color == "red" || color == "green");
///
/// abingo.bingo(&ctx, "button_color", BingoOptions::default())?;
/// assert_eq!(abingo.experiment("button_color")?.conversions(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Abingo<B, C> {
    backend: B,
    cache: C,
    config: AbingoConfig,
}

impl Abingo<MemoryExperimentStore, MemoryCache> {
    /// Facade over an in-memory store and cache with default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryExperimentStore::new(), MemoryCache::new())
    }
}

impl<B, C> Abingo<B, C>
where
    B: ExperimentBackend,
    C: Cache,
{
    /// Facade with default configuration.
    #[must_use]
    pub fn new(backend: B, cache: C) -> Self {
        Self {
            backend,
            cache,
            config: AbingoConfig::default(),
        }
    }

    /// Start building a facade with custom configuration.
    #[must_use]
    pub fn builder(backend: B, cache: C) -> AbingoBuilder<B, C> {
        AbingoBuilder {
            backend,
            cache,
            config: AbingoConfig::default(),
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &AbingoConfig {
        &self.config
    }

    /// The durable backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The cache.
    #[must_use]
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Request context for `identity`, salted with the configured salt.
    #[must_use]
    pub fn context(&self, identity: impl Into<Identity>) -> Context {
        Context::new(identity).with_salt(self.config.salt.clone())
    }

    /// Request context for an anonymous user with a generated identity.
    #[must_use]
    pub fn anonymous_context(&self) -> Context {
        self.context(Identity::generate())
    }

    /// Cached experiment store view.
    #[must_use]
    pub fn store(&self) -> ExperimentStore<'_, B, C> {
        ExperimentStore::new(&self.backend, &self.cache, &self.config.key_prefix)
            .cache_alternatives(self.config.cache_alternatives)
    }

    /// Participation/conversion ledger view.
    #[must_use]
    pub fn ledger(&self) -> Ledger<'_, B, C> {
        Ledger::new(self.store())
    }

    /// Choose the user's alternative for `name`, starting the experiment if needed.
    ///
    /// 1. If the experiment does not exist it is created from `alternatives`.
    ///    Losing a creation race to another caller is not an error.
    /// 2. The user is bucketed into the weight-flattened alternative list.
    /// 3. Participation is recorded (once, unless `multiple_participation`).
    ///
    /// Once an experiment exists its stored alternatives win over `alternatives`.
    ///
    /// # Errors
    ///
    /// - `Error::UnsupportedAlternativeSpec` / `Error::InvalidAlternativeSpec` for a bad spec
    /// - store and cache failures; no alternative is guessed when they occur
    pub fn test(
        &self,
        ctx: &Context,
        name: &str,
        alternatives: impl Into<AlternativeSpec>,
        options: &TestOptions,
    ) -> Result<Value> {
        let spec = alternatives.into();
        let store = self.store();

        if !store.exists(name)? {
            let parsed = alternatives::parse(&spec)?;
            store.start_experiment(name, &parsed, options.conversion.as_deref())?;
        }

        let flattened = store.alternatives_for(name, Some(&spec))?;
        let choice = bucket::choose(ctx, name, &flattened)?.clone();

        let ledger = Ledger::new(store);
        if let Some(conversion) = &options.conversion {
            ledger.listen(conversion, name)?;
        }
        ledger.record_participation_for(ctx, name, &choice, options.multiple_participation)?;
        Ok(choice)
    }

    /// [`Abingo::test`], deserializing the chosen content into `T`.
    ///
    /// # Errors
    ///
    /// Same as [`Abingo::test`], plus `Error::Serialization` if the content
    /// does not fit `T`.
    pub fn test_as<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        name: &str,
        alternatives: impl Into<AlternativeSpec>,
        options: &TestOptions,
    ) -> Result<T> {
        let choice = self.test(ctx, name, alternatives, options)?;
        Ok(serde_json::from_value(choice)?)
    }

    /// [`Abingo::test`], passing the chosen content to `f`.
    ///
    /// # Errors
    ///
    /// Same as [`Abingo::test`]; `f` is not called on error.
    pub fn test_with<R>(
        &self,
        ctx: &Context,
        name: &str,
        alternatives: impl Into<AlternativeSpec>,
        options: &TestOptions,
        f: impl FnOnce(&Value) -> R,
    ) -> Result<R> {
        let choice = self.test(ctx, name, alternatives, options)?;
        Ok(f(&choice))
    }

    /// Two-way test between `true` and `false`.
    ///
    /// # Errors
    ///
    /// Same as [`Abingo::test`], plus `Error::Serialization` if `name` was
    /// previously started with non-boolean alternatives.
    pub fn flip(&self, ctx: &Context, name: &str) -> Result<bool> {
        self.test_as(ctx, name, [true, false], &TestOptions::default())
    }

    /// Template-style helper: flip when no alternatives are given.
    ///
    /// # Errors
    ///
    /// Same as [`Abingo::test`].
    pub fn ab_test(
        &self,
        ctx: &Context,
        name: &str,
        alternatives: Option<AlternativeSpec>,
        options: &TestOptions,
    ) -> Result<Value> {
        match alternatives {
            Some(spec) => self.test(ctx, name, spec, options),
            None => self.flip(ctx, name).map(Value::Bool),
        }
    }

    /// Record a conversion.
    ///
    /// `target` may be `None` (every experiment the user participates in), a
    /// name (an experiment, or a conversion action that fans out to its
    /// experiments), or a list of names.
    ///
    /// # Errors
    ///
    /// Propagates store and cache failures.
    pub fn bingo(
        &self,
        ctx: &Context,
        target: impl Into<BingoTarget>,
        options: BingoOptions,
    ) -> Result<Vec<ConversionRecord>> {
        self.ledger().record_conversion(ctx, &target.into(), options)
    }

    /// Experiments the user has been counted into.
    ///
    /// # Errors
    ///
    /// Propagates cache failures.
    pub fn participating_tests(&self, ctx: &Context) -> Result<Vec<String>> {
        self.ledger().participating_tests(ctx)
    }

    /// Current snapshot of an experiment, for reporting.
    ///
    /// # Errors
    ///
    /// Returns `Error::ExperimentNotFound` if no experiment has this name.
    pub fn experiment(&self, name: &str) -> Result<Experiment> {
        self.backend
            .find_experiment(name)?
            .ok_or_else(|| Error::ExperimentNotFound(name.to_string()))
    }

    /// Snapshots of every experiment, sorted by name.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn experiments(&self) -> Result<Vec<Experiment>> {
        let mut experiments = Vec::new();
        for name in self.backend.experiment_names()? {
            // Deleted between listing and loading
            if let Some(experiment) = self.backend.find_experiment(&name)? {
                experiments.push(experiment);
            }
        }
        Ok(experiments)
    }

    /// Delete an experiment and its alternatives.
    ///
    /// # Errors
    ///
    /// Propagates store and cache failures.
    pub fn end_experiment(&self, name: &str) -> Result<bool> {
        self.store().end_experiment(name)
    }
}

/// Builder for [`Abingo`].
pub struct AbingoBuilder<B, C> {
    backend: B,
    cache: C,
    config: AbingoConfig,
}

impl<B, C> AbingoBuilder<B, C>
where
    B: ExperimentBackend,
    C: Cache,
{
    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: AbingoConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bucketing salt.
    #[must_use]
    pub fn salt(mut self, salt: impl Into<String>) -> Self {
        self.config.salt = salt.into();
        self
    }

    /// Set the cache key namespace.
    #[must_use]
    pub fn key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.config.key_prefix = key_prefix.into();
        self
    }

    /// Enable or disable caching of flattened alternative lists.
    #[must_use]
    pub const fn cache_alternatives(mut self, enabled: bool) -> Self {
        self.config.cache_alternatives = enabled;
        self
    }

    /// Build the facade.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    pub fn build(self) -> Result<Abingo<B, C>> {
        self.config.validate()?;
        Ok(Abingo {
            backend: self.backend,
            cache: self.cache,
            config: self.config,
        })
    }
}
