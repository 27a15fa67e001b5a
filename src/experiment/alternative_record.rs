//! Alternative Record - one variant of an experiment and its counters

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alternatives::WeightedAlternative;
use crate::bucket::lookup_key;

/// Aggregate counter column on an alternative row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Counter {
    /// Users counted into the alternative.
    Participants,
    /// Conversions attributed to the alternative.
    Conversions,
}

impl Counter {
    /// Column name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Participants => "participants",
            Self::Conversions => "conversions",
        }
    }
}

/// Alternative Record represents one variant shown to users.
///
/// Counters only ever grow and are only changed through
/// [`AlternativeRecord::increment`], which backends call in place on the
/// stored row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativeRecord {
    content: Value,
    weight: u32,
    lookup: String,
    participants: u64,
    conversions: u64,
}

impl AlternativeRecord {
    /// Create a fresh alternative with zeroed counters.
    #[must_use]
    pub fn new(experiment: &str, content: impl Into<Value>, weight: u32) -> Self {
        let content = content.into();
        Self {
            lookup: lookup_key(experiment, &content),
            content,
            weight,
            participants: 0,
            conversions: 0,
        }
    }

    /// Create one record per parsed alternative.
    #[must_use]
    pub fn from_parsed(experiment: &str, parsed: &[WeightedAlternative]) -> Vec<Self> {
        parsed
            .iter()
            .map(|alt| Self::new(experiment, alt.content.clone(), alt.weight))
            .collect()
    }

    /// Get the content shown to users.
    #[must_use]
    pub const fn content(&self) -> &Value {
        &self.content
    }

    /// Get the relative weight.
    #[must_use]
    pub const fn weight(&self) -> u32 {
        self.weight
    }

    /// Get the lookup key (hash of experiment name and content).
    #[must_use]
    pub fn lookup(&self) -> &str {
        &self.lookup
    }

    /// Get the participant count.
    #[must_use]
    pub const fn participants(&self) -> u64 {
        self.participants
    }

    /// Get the conversion count.
    #[must_use]
    pub const fn conversions(&self) -> u64 {
        self.conversions
    }

    /// Read a counter column by name.
    #[must_use]
    pub const fn counter(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Participants => self.participants,
            Counter::Conversions => self.conversions,
        }
    }

    /// Conversions per participant, NaN without participants.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn conversion_rate(&self) -> f64 {
        if self.participants == 0 {
            return f64::NAN;
        }
        self.conversions as f64 / self.participants as f64
    }

    /// Add one to a counter.
    pub fn increment(&mut self, counter: Counter) {
        match counter {
            Counter::Participants => self.participants = self.participants.saturating_add(1),
            Counter::Conversions => self.conversions = self.conversions.saturating_add(1),
        }
    }

    /// The `(content, weight)` pair this row was created from.
    #[must_use]
    pub fn weighted(&self) -> WeightedAlternative {
        WeightedAlternative {
            content: self.content.clone(),
            weight: self.weight,
        }
    }
}
