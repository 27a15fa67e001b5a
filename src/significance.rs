//! Significance Engine
//!
//! Pearson's chi-squared test on a 2×K contingency table: one column per
//! alternative, rows for non-converters and converters. Expected counts
//! apply the experiment's overall conversion rate to each alternative's
//! participants.
//!
//! The statistic is compared against critical values for `K - 1` degrees of
//! freedom and reported as the strongest [`SignificanceLevel`] it exceeds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::experiment::Experiment;
use crate::{Error, Result};

/// Critical values for p = 0.05, 0.01, 0.001 by degrees of freedom (1..=10).
const CRITICAL_VALUES: [[f64; 3]; 10] = [
    [3.841, 6.635, 10.828],
    [5.991, 9.210, 13.816],
    [7.815, 11.345, 16.266],
    [9.488, 13.277, 18.467],
    [11.070, 15.086, 20.515],
    [12.592, 16.812, 22.458],
    [14.067, 18.475, 24.322],
    [15.507, 20.090, 26.124],
    [16.919, 21.666, 27.877],
    [18.307, 23.209, 29.588],
];

/// Standard normal quantiles for the same p-values (Wilson-Hilferty beyond the table).
const NORMAL_QUANTILES: [f64; 3] = [1.644_854, 2.326_348, 3.090_232];

/// Confidence that alternatives convert differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignificanceLevel {
    /// No threshold exceeded (p = 1).
    None,
    /// p < 0.05
    P05,
    /// p < 0.01
    P01,
    /// p < 0.001
    P001,
}

impl SignificanceLevel {
    /// Levels from strictest to loosest.
    pub const THRESHOLDS: [Self; 3] = [Self::P001, Self::P01, Self::P05];

    /// The p-value this level stands for.
    #[must_use]
    pub const fn p_value(&self) -> f64 {
        match self {
            Self::None => 1.0,
            Self::P05 => 0.05,
            Self::P01 => 0.01,
            Self::P001 => 0.001,
        }
    }

    /// Confidence as a percentage, e.g. `99.0` for `P01`.
    #[must_use]
    pub fn confidence_percent(&self) -> f64 {
        (1.0 - self.p_value()) * 100.0
    }

    const fn column(self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::P05 => Some(0),
            Self::P01 => Some(1),
            Self::P001 => Some(2),
        }
    }
}

impl fmt::Display for SignificanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("not significant"),
            level => write!(f, "p < {}", level.p_value()),
        }
    }
}

/// Critical chi-squared value for `degrees_of_freedom` at `level`.
///
/// Returns `f64::INFINITY` for [`SignificanceLevel::None`]. Degrees of
/// freedom above 10 use the Wilson-Hilferty approximation; 0 is treated as 1.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn critical_value(degrees_of_freedom: usize, level: SignificanceLevel) -> f64 {
    let Some(column) = level.column() else {
        return f64::INFINITY;
    };
    let df = degrees_of_freedom.max(1);
    if let Some(row) = CRITICAL_VALUES.get(df - 1) {
        return row[column];
    }
    let k = df as f64;
    let h = 2.0 / (9.0 * k);
    k * (1.0 - h + NORMAL_QUANTILES[column] * h.sqrt()).powi(3)
}

/// Chi-squared statistic from `(participants, conversions)` per alternative.
///
/// Cells whose expected count is zero contribute nothing, so an experiment
/// nobody has seen yet scores 0.
///
/// # Errors
///
/// Returns `Error::NoAlternatives` (naming `experiment`) if `counts` is empty.
#[allow(clippy::cast_precision_loss)]
pub fn chi_squared_counts(experiment: &str, counts: &[(u64, u64)]) -> Result<f64> {
    if counts.is_empty() {
        return Err(Error::NoAlternatives(experiment.to_string()));
    }

    let participants: u64 = counts.iter().map(|&(p, _)| p).sum();
    if participants == 0 {
        return Ok(0.0);
    }
    let conversions: u64 = counts.iter().map(|&(_, c)| c).sum();
    let rate = conversions as f64 / participants as f64;

    let mut statistic = 0.0;
    for &(p, c) in counts {
        let observed_converters = c as f64;
        let observed_non_converters = p.saturating_sub(c) as f64;
        let expected_converters = rate * p as f64;
        let expected_non_converters = (1.0 - rate) * p as f64;

        for (observed, expected) in [
            (observed_non_converters, expected_non_converters),
            (observed_converters, expected_converters),
        ] {
            if expected > 0.0 {
                statistic += (observed - expected).powi(2) / expected;
            }
        }
    }
    Ok(statistic)
}

/// Chi-squared statistic for an experiment.
///
/// # Errors
///
/// Returns `Error::NoAlternatives` if the experiment has no alternatives.
pub fn chi_squared(experiment: &Experiment) -> Result<f64> {
    let counts: Vec<(u64, u64)> = experiment
        .alternatives()
        .iter()
        .map(|alt| (alt.participants(), alt.conversions()))
        .collect();
    chi_squared_counts(experiment.name(), &counts)
}

/// Map a statistic to the strongest level whose critical value it exceeds.
#[must_use]
pub fn level_for(statistic: f64, degrees_of_freedom: usize) -> SignificanceLevel {
    SignificanceLevel::THRESHOLDS
        .into_iter()
        .find(|&level| statistic > critical_value(degrees_of_freedom, level))
        .unwrap_or(SignificanceLevel::None)
}

/// Significance level of an experiment's results.
///
/// # Errors
///
/// Returns `Error::NoAlternatives` if the experiment has no alternatives.
pub fn significance_level(experiment: &Experiment) -> Result<SignificanceLevel> {
    let statistic = chi_squared(experiment)?;
    let degrees_of_freedom = experiment.alternatives().len().saturating_sub(1);
    Ok(level_for(statistic, degrees_of_freedom))
}
