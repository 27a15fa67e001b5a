//! Experiments and their alternatives
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< AlternativeRecord (N)
//!                            ├── content, weight, lookup
//!                            └── participants, conversions (counters)
//! ```
//!
//! [`ExperimentBackend`] is the durable store for these rows;
//! [`ExperimentStore`] layers the cache on top.
//!
//! ## Usage
//!
//! ```rust
//! use abingo::alternatives::{parse, AlternativeSpec};
//! use abingo::cache::MemoryCache;
//! use abingo::experiment::{ExperimentStore, MemoryExperimentStore};
//!
//! let backend = MemoryExperimentStore::new();
//! let cache = MemoryCache::new();
//! let store = ExperimentStore::new(&backend, &cache, "abingo");
//!
//! let parsed = parse(&AlternativeSpec::weighted([("red", 1), ("blue", 3)])).unwrap();
//! store.start_experiment("button_color", &parsed, None).unwrap();
//!
//! assert!(store.exists("button_color").unwrap());
//! assert_eq!(store.alternatives_for("button_color", None).unwrap().len(), 4);
//! ```

mod alternative_record;
mod backend;
mod experiment_record;
mod snapshot;
mod store;

pub use alternative_record::{AlternativeRecord, Counter};
pub use backend::{ExperimentBackend, MemoryExperimentStore};
pub use experiment_record::{ExperimentRecord, ExperimentRecordBuilder};
pub use snapshot::Experiment;
pub use store::ExperimentStore;
