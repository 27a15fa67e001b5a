//! Participation/Conversion Ledger
//!
//! Per-user bookkeeping lives in the cache:
//!
//! - the list of experiments a user has been counted into
//! - a conversion counter per `(user, experiment)`
//!
//! Aggregate counters are incremented on the chosen alternative in the
//! durable store. The chosen alternative is never stored; it is recomputed
//! from `(salt, experiment, identity)` by the bucketer.
//!
//! Participation entries, conversion counters and conversion listeners are
//! tagged with the experiment's generation. After `end_experiment` the old
//! entries no longer match, so a restarted experiment starts from zero.
//!
//! The per-user read-modify-write is not locked. Two concurrent requests for
//! the same user can at worst lose one of that user's events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::bucket::{self, lookup_key};
use crate::cache::{Cache, CacheExt, CacheKey};
use crate::experiment::{Counter, ExperimentBackend, ExperimentStore};
use crate::identity::Context;
use crate::{Error, Result};

/// What to convert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BingoTarget {
    /// Every experiment the user participates in.
    #[default]
    AllParticipating,
    /// One experiment name or conversion name.
    Named(String),
    /// Several names, each handled like [`BingoTarget::Named`].
    Many(Vec<String>),
}

impl From<&str> for BingoTarget {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for BingoTarget {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl<T: Into<String>> From<Vec<T>> for BingoTarget {
    fn from(names: Vec<T>) -> Self {
        Self::Many(names.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<String>, const N: usize> From<[T; N]> for BingoTarget {
    fn from(names: [T; N]) -> Self {
        Self::Many(names.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<String>> From<Option<T>> for BingoTarget {
    fn from(name: Option<T>) -> Self {
        name.map_or(Self::AllParticipating, |n| Self::Named(n.into()))
    }
}

/// Options for recording conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BingoOptions {
    /// Count every conversion, not just the user's first per experiment.
    pub multiple_conversions: bool,
    /// Convert even if the user was never counted as a participant.
    pub assume_participation: bool,
}

impl BingoOptions {
    /// Count repeat conversions.
    #[must_use]
    pub const fn multiple_conversions(mut self) -> Self {
        self.multiple_conversions = true;
        self
    }

    /// Skip the participation check.
    #[must_use]
    pub const fn assume_participation(mut self) -> Self {
        self.assume_participation = true;
        self
    }
}

/// Result of recording a participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipationOutcome {
    /// The alternative's participant counter was incremented.
    Counted,
    /// The user was already counted and multiple participation was off.
    AlreadyParticipating,
}

/// Result of recording a conversion against one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionOutcome {
    /// The alternative's conversion counter was incremented.
    Recorded,
    /// The user already converted and multiple conversions was off.
    AlreadyConverted,
    /// The user never participated and participation was not assumed.
    NotParticipating,
    /// No experiment with this name exists.
    UnknownExperiment,
}

/// Conversion outcome for one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// Experiment the conversion was considered for.
    pub experiment: String,
    /// What happened.
    pub outcome: ConversionOutcome,
}

/// An experiment name pinned to one incarnation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Enrollment {
    experiment: String,
    generation: u64,
}

impl Enrollment {
    fn new(experiment: &str, generation: u64) -> Self {
        Self {
            experiment: experiment.to_string(),
            generation,
        }
    }

    fn is(&self, experiment: &str, generation: u64) -> bool {
        self.experiment == experiment && self.generation == generation
    }
}

/// Participation and conversion accounting over an [`ExperimentStore`].
pub struct Ledger<'a, B: ?Sized, C: ?Sized> {
    store: ExperimentStore<'a, B, C>,
}

impl<'a, B, C> Ledger<'a, B, C>
where
    B: ExperimentBackend + ?Sized,
    C: Cache + ?Sized,
{
    /// Create a ledger over a store view.
    #[must_use]
    pub const fn new(store: ExperimentStore<'a, B, C>) -> Self {
        Self { store }
    }

    /// Experiments the user has been counted into, in first-seen order.
    ///
    /// Ended experiments, and earlier incarnations of restarted ones, are
    /// left out.
    ///
    /// # Errors
    ///
    /// Propagates cache failures and undecodable cache values.
    pub fn participating_tests(&self, ctx: &Context) -> Result<Vec<String>> {
        let enrollments = self.enrollments(ctx)?;
        Ok(self
            .live(enrollments)?
            .into_iter()
            .map(|e| e.experiment)
            .collect())
    }

    fn enrollments(&self, ctx: &Context) -> Result<Vec<Enrollment>> {
        let key = self
            .store
            .key(&CacheKey::ParticipatingTests(ctx.identity().as_str()));
        Ok(self.store.cache().read_json(&key)?.unwrap_or_default())
    }

    /// Keep the entries whose generation is still the live one.
    fn live(&self, enrollments: Vec<Enrollment>) -> Result<Vec<Enrollment>> {
        let mut live = Vec::with_capacity(enrollments.len());
        for enrollment in enrollments {
            if self.store.generation(&enrollment.experiment)? == Some(enrollment.generation) {
                live.push(enrollment);
            }
        }
        Ok(live)
    }

    fn current_generation(&self, experiment: &str) -> Result<u64> {
        self.store
            .generation(experiment)?
            .ok_or_else(|| Error::ExperimentNotFound(experiment.to_string()))
    }

    /// The content this user is assigned in `experiment`.
    ///
    /// # Errors
    ///
    /// - `Error::ExperimentNotFound` if the experiment is unknown
    /// - `Error::NoAlternatives` if it has no alternatives
    pub fn assignment(&self, ctx: &Context, experiment: &str) -> Result<Value> {
        let alternatives = self.store.alternatives_for(experiment, None)?;
        Ok(bucket::choose(ctx, experiment, &alternatives)?.clone())
    }

    /// Count the user into `experiment`.
    ///
    /// The first participation is always counted. Later ones are counted
    /// only with `allow_multiple`. The experiment is added to the user's
    /// participating list once.
    ///
    /// # Errors
    ///
    /// Propagates store and cache failures.
    pub fn record_participation(
        &self,
        ctx: &Context,
        experiment: &str,
        allow_multiple: bool,
    ) -> Result<ParticipationOutcome> {
        self.participate(ctx, experiment, None, allow_multiple)
    }

    /// [`Ledger::record_participation`] with the assignment already computed.
    pub(crate) fn record_participation_for(
        &self,
        ctx: &Context,
        experiment: &str,
        chosen: &Value,
        allow_multiple: bool,
    ) -> Result<ParticipationOutcome> {
        self.participate(ctx, experiment, Some(chosen), allow_multiple)
    }

    fn participate(
        &self,
        ctx: &Context,
        experiment: &str,
        chosen: Option<&Value>,
        allow_multiple: bool,
    ) -> Result<ParticipationOutcome> {
        let generation = self.current_generation(experiment)?;
        let mut enrollments = self.enrollments(ctx)?;
        let already = enrollments.iter().any(|e| e.is(experiment, generation));
        if already && !allow_multiple {
            return Ok(ParticipationOutcome::AlreadyParticipating);
        }

        let chosen = match chosen {
            Some(chosen) => chosen.clone(),
            None => self.assignment(ctx, experiment)?,
        };
        self.score(experiment, &chosen, Counter::Participants)?;
        debug!(
            experiment,
            identity = %ctx.identity(),
            alternative = %chosen,
            "participation counted"
        );

        if !already {
            // Drop entries left over from an ended incarnation
            enrollments.retain(|e| e.experiment != experiment);
            enrollments.push(Enrollment::new(experiment, generation));
            let key = self
                .store
                .key(&CacheKey::ParticipatingTests(ctx.identity().as_str()));
            self.store.cache().write_json(&key, &enrollments)?;
        }
        Ok(ParticipationOutcome::Counted)
    }

    /// Register `experiment` as converted by the `conversion` action.
    ///
    /// # Errors
    ///
    /// - `Error::ExperimentNotFound` if the experiment is unknown
    /// - cache and backend failures
    pub fn listen(&self, conversion: &str, experiment: &str) -> Result<()> {
        let generation = self.current_generation(experiment)?;
        let stored = self.listener_entries(conversion)?;
        let stored_len = stored.len();
        let mut listeners = self.live(stored)?;
        let registered = listeners.iter().any(|l| l.is(experiment, generation));
        if !registered {
            listeners.push(Enrollment::new(experiment, generation));
        }
        if !registered || listeners.len() != stored_len {
            let key = self.store.key(&CacheKey::ConversionListeners(conversion));
            self.store.cache().write_json(&key, &listeners)?;
        }
        Ok(())
    }

    /// Live experiments converted by the `conversion` action.
    ///
    /// Falls back to the experiments stored with this conversion name when
    /// the cache has no entry; a non-empty answer is cached.
    ///
    /// # Errors
    ///
    /// Propagates cache and backend failures.
    pub fn listeners(&self, conversion: &str) -> Result<Vec<String>> {
        let stored = self.listener_entries(conversion)?;
        Ok(self
            .live(stored)?
            .into_iter()
            .map(|l| l.experiment)
            .collect())
    }

    fn listener_entries(&self, conversion: &str) -> Result<Vec<Enrollment>> {
        let key = self.store.key(&CacheKey::ConversionListeners(conversion));
        if let Some(listeners) = self.store.cache().read_json::<Vec<Enrollment>>(&key)? {
            return Ok(listeners);
        }
        let mut listeners = Vec::new();
        for experiment in self.store.backend().experiments_converting_on(conversion)? {
            if let Some(generation) = self.store.generation(&experiment)? {
                listeners.push(Enrollment::new(&experiment, generation));
            }
        }
        if !listeners.is_empty() {
            self.store.cache().write_json(&key, &listeners)?;
        }
        Ok(listeners)
    }

    /// Record a conversion.
    ///
    /// - [`BingoTarget::AllParticipating`] converts every experiment the user is in.
    /// - [`BingoTarget::Named`] converts the experiments listening to that
    ///   conversion name, or the experiment of that name if nothing listens.
    /// - [`BingoTarget::Many`] handles each name in turn.
    ///
    /// Each experiment is converted at most once per user unless
    /// `multiple_conversions` is set.
    ///
    /// # Errors
    ///
    /// Propagates store and cache failures.
    pub fn record_conversion(
        &self,
        ctx: &Context,
        target: &BingoTarget,
        options: BingoOptions,
    ) -> Result<Vec<ConversionRecord>> {
        let tests = self.participating_tests(ctx)?;
        match target {
            BingoTarget::AllParticipating => tests
                .iter()
                .map(|experiment| self.convert_experiment(ctx, experiment, &tests, options))
                .collect(),
            BingoTarget::Named(name) => self.convert_name(ctx, name, &tests, options),
            BingoTarget::Many(names) => {
                let mut records = Vec::new();
                for name in names {
                    records.extend(self.convert_name(ctx, name, &tests, options)?);
                }
                Ok(records)
            }
        }
    }

    fn convert_name(
        &self,
        ctx: &Context,
        name: &str,
        tests: &[String],
        options: BingoOptions,
    ) -> Result<Vec<ConversionRecord>> {
        let mut experiments = self.listeners(name)?;
        if experiments.is_empty() {
            experiments.push(name.to_string());
        } else if tests.iter().any(|t| t == name) && !experiments.iter().any(|e| e == name) {
            // An experiment that shares its name with a conversion action
            experiments.push(name.to_string());
        }

        experiments
            .iter()
            .map(|experiment| self.convert_experiment(ctx, experiment, tests, options))
            .collect()
    }

    fn convert_experiment(
        &self,
        ctx: &Context,
        experiment: &str,
        tests: &[String],
        options: BingoOptions,
    ) -> Result<ConversionRecord> {
        let record = |outcome| ConversionRecord {
            experiment: experiment.to_string(),
            outcome,
        };

        let Some(generation) = self.store.generation(experiment)? else {
            warn!(experiment, "conversion for unknown experiment ignored");
            return Ok(record(ConversionOutcome::UnknownExperiment));
        };
        if !options.assume_participation && !tests.iter().any(|t| t == experiment) {
            return Ok(record(ConversionOutcome::NotParticipating));
        }

        let key = self.store.key(&CacheKey::Conversions {
            identity: ctx.identity().as_str(),
            name: experiment,
            generation,
        });
        if !options.multiple_conversions {
            let converted: Option<u64> = self.store.cache().read_json(&key)?;
            if converted.unwrap_or(0) > 0 {
                return Ok(record(ConversionOutcome::AlreadyConverted));
            }
        }

        let chosen = self.assignment(ctx, experiment)?;
        self.score(experiment, &chosen, Counter::Conversions)?;
        self.store.cache().increment(&key)?;
        debug!(
            experiment,
            identity = %ctx.identity(),
            alternative = %chosen,
            "conversion recorded"
        );
        Ok(record(ConversionOutcome::Recorded))
    }

    fn score(&self, experiment: &str, content: &Value, counter: Counter) -> Result<()> {
        self.store
            .backend()
            .increment(experiment, &lookup_key(experiment, content), counter)
    }
}
