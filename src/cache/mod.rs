//! Cache collaborator
//!
//! Per-user ledger state (participating experiments, conversion counters)
//! and derived lookup tables (existence markers, flattened alternatives)
//! live in a cache. The cache is not authoritative: aggregate counters live
//! in the [`ExperimentBackend`](crate::experiment::ExperimentBackend).
//!
//! Values are opaque bytes at the trait level; [`CacheExt`] layers JSON on
//! top so the ledger can store typed values.
//!
//! # Example
//!
//! ```rust
//! use abingo::cache::{Cache, CacheExt, MemoryCache};
//!
//! # fn example() -> abingo::Result<()> {
//! let cache = MemoryCache::new();
//!
//! cache.write_json("tests", &vec!["checkout"])?;
//! let tests: Option<Vec<String>> = cache.read_json("tests")?;
//! assert_eq!(tests, Some(vec!["checkout".to_string()]));
//!
//! assert_eq!(cache.increment("hits")?, 1);
//! assert_eq!(cache.increment("hits")?, 2);
//!
//! cache.delete("hits")?;
//! assert!(!cache.exists("hits")?);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod memory;

pub use memory::MemoryCache;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// Key-value cache used for ledger bookkeeping.
///
/// Implementations surface transient failures as `Error::Cache` and never
/// retry internally.
pub trait Cache: Send + Sync {
    /// Read a value. Returns `None` if the key doesn't exist.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, overwriting any existing one.
    fn write(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a key. No-op if the key doesn't exist.
    fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically add one to a counter stored as a JSON unsigned integer.
    ///
    /// Absent keys start at zero, so the first increment returns 1.
    fn increment(&self, key: &str) -> Result<u64>;

    /// Drop every entry.
    fn clear(&self) -> Result<()>;
}

impl<C: Cache + ?Sized> Cache for Arc<C> {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: Vec<u8>) -> Result<()> {
        (**self).write(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key)
    }

    fn increment(&self, key: &str) -> Result<u64> {
        (**self).increment(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// Typed JSON access on top of any [`Cache`].
pub trait CacheExt: Cache {
    /// Read and deserialize a value.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if the stored bytes are not valid JSON for `T`.
    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize and write a value.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if `value` cannot be serialized.
    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.write(key, serde_json::to_vec(value)?)
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

/// Every cache entry the library reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey<'a> {
    /// Positive existence marker for an experiment.
    Exists(&'a str),
    /// Generation of the live incarnation of an experiment.
    Generation(&'a str),
    /// Weight-flattened alternative list for an experiment.
    Alternatives(&'a str),
    /// Experiments a user has been counted into.
    ParticipatingTests(&'a str),
    /// Conversions recorded for one user against one experiment incarnation.
    Conversions {
        /// User identity.
        identity: &'a str,
        /// Experiment name.
        name: &'a str,
        /// Experiment generation.
        generation: u64,
    },
    /// Experiments converted by a named conversion action.
    ConversionListeners(&'a str),
}

impl CacheKey<'_> {
    /// Render as `<prefix>::<kind>::<json array of segments>`.
    ///
    /// The segments are JSON encoded, so identities or names containing the
    /// separator cannot make two keys collide.
    #[must_use]
    pub fn render(&self, prefix: &str) -> String {
        let (kind, segments): (&str, Vec<Value>) = match *self {
            Self::Exists(name) => ("exists", vec![name.into()]),
            Self::Generation(name) => ("generation", vec![name.into()]),
            Self::Alternatives(name) => ("alternatives", vec![name.into()]),
            Self::ParticipatingTests(identity) => ("participating_tests", vec![identity.into()]),
            Self::Conversions {
                identity,
                name,
                generation,
            } => ("conversions", vec![identity.into(), name.into(), generation.into()]),
            Self::ConversionListeners(conversion) => ("conversion_listeners", vec![conversion.into()]),
        };
        format!("{prefix}::{kind}::{}", Value::Array(segments))
    }
}
