//! Experiment snapshot - a record together with its alternatives
//!
//! This is what reporting consumers read: derived totals, the leading
//! alternative, and significance.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AlternativeRecord, Counter, ExperimentRecord};
use crate::alternatives::WeightedAlternative;
use crate::significance::{self, SignificanceLevel};
use crate::Result;

/// Point-in-time view of an experiment and its alternatives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    record: ExperimentRecord,
    alternatives: Vec<AlternativeRecord>,
}

impl Experiment {
    /// Pair a record with its alternatives (creation order).
    #[must_use]
    pub const fn new(record: ExperimentRecord, alternatives: Vec<AlternativeRecord>) -> Self {
        Self {
            record,
            alternatives,
        }
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.record.name()
    }

    /// Get the underlying record.
    #[must_use]
    pub const fn record(&self) -> &ExperimentRecord {
        &self.record
    }

    /// Get the alternatives in creation order.
    #[must_use]
    pub fn alternatives(&self) -> &[AlternativeRecord] {
        &self.alternatives
    }

    pub(crate) fn alternatives_mut(&mut self) -> &mut [AlternativeRecord] {
        &mut self.alternatives
    }

    /// Find the alternative showing `content`.
    #[must_use]
    pub fn alternative_for(&self, content: &Value) -> Option<&AlternativeRecord> {
        self.alternatives.iter().find(|alt| alt.content() == content)
    }

    /// Find an alternative by lookup key.
    #[must_use]
    pub fn alternative_by_lookup(&self, lookup: &str) -> Option<&AlternativeRecord> {
        self.alternatives.iter().find(|alt| alt.lookup() == lookup)
    }

    /// The `(content, weight)` pairs the experiment was started with.
    #[must_use]
    pub fn weighted(&self) -> Vec<WeightedAlternative> {
        self.alternatives.iter().map(AlternativeRecord::weighted).collect()
    }

    /// Sum a counter across all alternatives.
    #[must_use]
    pub fn sum(&self, counter: Counter) -> u64 {
        self.alternatives.iter().map(|alt| alt.counter(counter)).sum()
    }

    /// Total participants across alternatives.
    #[must_use]
    pub fn participants(&self) -> u64 {
        self.sum(Counter::Participants)
    }

    /// Total conversions across alternatives.
    #[must_use]
    pub fn conversions(&self) -> u64 {
        self.sum(Counter::Conversions)
    }

    /// Overall conversions per participant, NaN without participants.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn conversion_rate(&self) -> f64 {
        let participants = self.participants();
        if participants == 0 {
            return f64::NAN;
        }
        self.conversions() as f64 / participants as f64
    }

    /// Alternative with the highest conversion rate.
    ///
    /// Alternatives without participants only win if nobody participated
    /// yet, in which case the first alternative is returned. Ties keep the
    /// earlier alternative.
    #[must_use]
    pub fn best_alternative(&self) -> Option<&AlternativeRecord> {
        let mut best: Option<&AlternativeRecord> = None;
        for alt in self.alternatives.iter().filter(|alt| alt.participants() > 0) {
            match best {
                Some(current) if current.conversion_rate() >= alt.conversion_rate() => {}
                _ => best = Some(alt),
            }
        }
        best.or_else(|| self.alternatives.first())
    }

    /// Chi-squared statistic over the converters/non-converters table.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoAlternatives` if the experiment has no alternatives.
    pub fn chi_squared(&self) -> Result<f64> {
        significance::chi_squared(self)
    }

    /// Strongest significance level the statistic exceeds.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoAlternatives` if the experiment has no alternatives.
    pub fn significance_level(&self) -> Result<SignificanceLevel> {
        significance::significance_level(self)
    }
}
