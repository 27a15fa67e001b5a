//! Alternative Parser
//!
//! Callers describe the variants of an experiment in whichever shape is
//! convenient. Everything is normalized to an ordered list of
//! `(content, weight)` pairs, one per distinct content, in order of first
//! appearance.
//!
//! | Spec                         | Alternatives                     |
//! |------------------------------|----------------------------------|
//! | `List([a, b, c])`            | `a`, `b`, `c`, weight 1 each     |
//! | `Count(3)`                   | `1`, `2`, `3`, weight 1 each     |
//! | `Range(2..=5)`               | `2`, `3`, `4`, `5`, weight 1 each |
//! | `Weighted({a: 2, b: 3})`     | `a` weight 2, `b` weight 3       |
//!
//! Bucketing works on the *flattened* form where each content is repeated
//! `weight` times, so a uniform choice over the flat list is weight
//! proportional.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::{Range, RangeInclusive};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Upper bound on the flattened alternative list.
pub const MAX_FLATTENED_ALTERNATIVES: u64 = 1_000_000;

/// The ways an experiment's variants can be specified.
#[derive(Debug, Clone, PartialEq)]
pub enum AlternativeSpec {
    /// Explicit ordered values, weight 1 each. Repeats add weight.
    List(Vec<Value>),
    /// `1..=n`, weight 1 each.
    Count(u64),
    /// Every integer of the range, weight 1 each.
    Range(RangeInclusive<i64>),
    /// Content to weight, in iteration order. Weights must be positive integers.
    Weighted(Vec<(Value, Value)>),
}

/// One distinct alternative and its relative weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedAlternative {
    /// Value shown to the user.
    pub content: Value,
    /// Relative probability mass, at least 1.
    pub weight: u32,
}

impl WeightedAlternative {
    /// Create a weighted alternative.
    #[must_use]
    pub fn new(content: impl Into<Value>, weight: u32) -> Self {
        Self {
            content: content.into(),
            weight,
        }
    }
}

impl AlternativeSpec {
    /// Build a list spec from anything convertible to JSON values.
    #[must_use]
    pub fn list<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// Build a weighted spec.
    ///
    /// ```rust
    /// use abingo::alternatives::{parse, AlternativeSpec};
    ///
    /// let spec = AlternativeSpec::weighted([("a", 2), ("b", 3)]);
    /// let parsed = parse(&spec).unwrap();
    /// assert_eq!(parsed[1].weight, 3);
    /// ```
    #[must_use]
    pub fn weighted<K: Into<Value>, W: Into<Value>>(
        pairs: impl IntoIterator<Item = (K, W)>,
    ) -> Self {
        Self::Weighted(
            pairs
                .into_iter()
                .map(|(k, w)| (k.into(), w.into()))
                .collect(),
        )
    }

    /// Interpret an untyped JSON value as a spec.
    ///
    /// - array: [`AlternativeSpec::List`]
    /// - non-negative integer: [`AlternativeSpec::Count`]
    /// - `"a..b"` or `"a..=b"` string: inclusive [`AlternativeSpec::Range`];
    ///   `"a...b"` excludes `b`
    /// - object: [`AlternativeSpec::Weighted`], keys become string content
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedAlternativeSpec` for any other shape.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Array(values) => Ok(Self::List(values)),
            Value::Number(ref n) => n
                .as_u64()
                .map(Self::Count)
                .ok_or_else(|| Error::UnsupportedAlternativeSpec(value.to_string())),
            Value::String(ref s) => {
                parse_range_literal(s).ok_or_else(|| Error::UnsupportedAlternativeSpec(value.to_string()))
            }
            Value::Object(map) => Ok(Self::Weighted(
                map.into_iter().map(|(k, w)| (Value::String(k), w)).collect(),
            )),
            other => Err(Error::UnsupportedAlternativeSpec(other.to_string())),
        }
    }
}

fn parse_range_literal(s: &str) -> Option<AlternativeSpec> {
    // "a..b" and "a..=b" include b, "a...b" excludes it
    let (start, end, exclusive) = if let Some((start, end)) = s.split_once("..=") {
        (start, end, false)
    } else if let Some((start, end)) = s.split_once("...") {
        (start, end, true)
    } else {
        let (start, end) = s.split_once("..")?;
        (start, end, false)
    };
    let start: i64 = start.trim().parse().ok()?;
    let end: i64 = end.trim().parse().ok()?;
    if exclusive {
        Some(AlternativeSpec::from(start..end))
    } else {
        Some(AlternativeSpec::Range(start..=end))
    }
}

impl<T: Into<Value>> From<Vec<T>> for AlternativeSpec {
    fn from(values: Vec<T>) -> Self {
        Self::list(values)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for AlternativeSpec {
    fn from(values: [T; N]) -> Self {
        Self::list(values)
    }
}

impl From<u64> for AlternativeSpec {
    fn from(n: u64) -> Self {
        Self::Count(n)
    }
}

impl From<RangeInclusive<i64>> for AlternativeSpec {
    fn from(range: RangeInclusive<i64>) -> Self {
        Self::Range(range)
    }
}

impl From<Range<i64>> for AlternativeSpec {
    #[allow(clippy::range_minus_one)]
    fn from(range: Range<i64>) -> Self {
        if range.is_empty() {
            return Self::Range(1..=0);
        }
        Self::Range(range.start..=range.end - 1)
    }
}

/// Normalize a spec into distinct `(content, weight)` pairs.
///
/// # Errors
///
/// - `Error::InvalidAlternativeSpec` if a weight is not a positive integer,
///   `spec` yields no alternatives, or the flattened list would exceed
///   [`MAX_FLATTENED_ALTERNATIVES`].
pub fn parse(spec: &AlternativeSpec) -> Result<Vec<WeightedAlternative>> {
    let mut parsed: Vec<WeightedAlternative> = Vec::new();
    match spec {
        AlternativeSpec::List(values) => {
            check_size(values.len() as u64)?;
            let mut index = HashMap::with_capacity(values.len());
            for value in values {
                add_weight(&mut parsed, &mut index, value.clone(), 1);
            }
        }
        AlternativeSpec::Count(n) => {
            check_size(*n)?;
            for i in 1..=*n {
                parsed.push(WeightedAlternative::new(i, 1));
            }
        }
        AlternativeSpec::Range(range) => {
            if !range.is_empty() {
                let size = range.end().abs_diff(*range.start()).saturating_add(1);
                check_size(size)?;
            }
            for i in range.clone() {
                parsed.push(WeightedAlternative::new(i, 1));
            }
        }
        AlternativeSpec::Weighted(pairs) => {
            let mut index = HashMap::with_capacity(pairs.len());
            for (content, weight) in pairs {
                let weight = weight_of(content, weight)?;
                add_weight(&mut parsed, &mut index, content.clone(), weight);
            }
        }
    }

    if parsed.is_empty() {
        return Err(Error::InvalidAlternativeSpec(
            "an experiment needs at least one alternative".to_string(),
        ));
    }
    check_size(parsed.iter().map(|a| u64::from(a.weight)).sum())?;
    Ok(parsed)
}

/// Expand weighted alternatives into the flat list used for bucketing.
#[must_use]
pub fn flatten(alternatives: &[WeightedAlternative]) -> Vec<Value> {
    alternatives
        .iter()
        .flat_map(|alt| std::iter::repeat(alt.content.clone()).take(alt.weight as usize))
        .collect()
}

/// [`parse`] followed by [`flatten`].
///
/// # Errors
///
/// Same as [`parse`].
pub fn parse_flat(spec: &AlternativeSpec) -> Result<Vec<Value>> {
    Ok(flatten(&parse(spec)?))
}

/// Merge `content` into `parsed`, keyed by its JSON text like `lookup_key`.
fn add_weight(
    parsed: &mut Vec<WeightedAlternative>,
    index: &mut HashMap<String, usize>,
    content: Value,
    weight: u32,
) {
    match index.entry(content.to_string()) {
        Entry::Occupied(slot) => {
            let existing = &mut parsed[*slot.get()];
            existing.weight = existing.weight.saturating_add(weight);
        }
        Entry::Vacant(slot) => {
            slot.insert(parsed.len());
            parsed.push(WeightedAlternative { content, weight });
        }
    }
}

fn weight_of(content: &Value, weight: &Value) -> Result<u32> {
    let Some(w) = weight.as_i64() else {
        return Err(Error::InvalidAlternativeSpec(format!(
            "weight {weight} for {content} needed to be an integer"
        )));
    };
    if w <= 0 {
        return Err(Error::InvalidAlternativeSpec(format!(
            "weight {w} for {content} must be positive"
        )));
    }
    u32::try_from(w).map_err(|_| {
        Error::InvalidAlternativeSpec(format!("weight {w} for {content} is too large"))
    })
}

fn check_size(size: u64) -> Result<()> {
    if size > MAX_FLATTENED_ALTERNATIVES {
        return Err(Error::InvalidAlternativeSpec(format!(
            "{size} alternatives exceeds the limit of {MAX_FLATTENED_ALTERNATIVES}"
        )));
    }
    Ok(())
}
