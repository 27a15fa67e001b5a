//! # abingo: deterministic A/B split testing
//!
//! Given a named experiment and a set of variants, abingo assigns each user
//! to one variant by hashing `(salt, experiment, identity)`, counts the user
//! as a participant once, and records conversions against the variant they
//! saw. Results are checked with a chi-squared test.
//!
//! ## Components
//!
//! - [`identity`]: user identity and the request-scoped [`Context`]
//! - [`alternatives`]: list / count / range / weighted specs to weighted variants
//! - [`bucket`]: MD5-based deterministic bucketing
//! - [`experiment`]: records, the durable [`ExperimentBackend`](experiment::ExperimentBackend), cached store
//! - [`cache`]: the [`Cache`](cache::Cache) collaborator and an in-memory implementation
//! - [`ledger`]: participation and conversion accounting
//! - [`significance`]: chi-squared statistic and significance level
//! - [`Abingo`]: the facade tying it together
//!
//! ## Example Usage
//!
//! ```rust
//! use abingo::{Abingo, AlternativeSpec, BingoOptions, TestOptions};
//!
//! # fn main() -> abingo::Result<()> {
//! let abingo = Abingo::in_memory();
//!
//! // Same user, same answer, every time
//! let ctx = abingo.context("user-1001");
//! let price = abingo.test(&ctx, "price_point", AlternativeSpec::weighted([(19, 1), (29, 3)]), &TestOptions::default())?;
//! assert_eq!(price, abingo.test(&ctx, "price_point", AlternativeSpec::Count(2), &TestOptions::default())?);
//!
//! // Several experiments can share one conversion action
//! let options = TestOptions::default().conversion("purchase");
//! abingo.test(&ctx, "headline", ["Save now", "Buy today"], &options)?;
//! abingo.bingo(&ctx, "purchase", BingoOptions::default())?;
//!
//! let report = abingo.experiment("headline")?;
//! assert_eq!(report.conversions(), 1);
//! println!("headline: {}", report.significance_level()?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod alternatives;
pub mod bucket;
pub mod cache;
pub mod config;
pub mod error;
pub mod experiment;
mod facade;
pub mod identity;
pub mod ledger;
pub mod significance;

pub use alternatives::AlternativeSpec;
pub use config::AbingoConfig;
pub use error::{Error, Result};
pub use facade::{Abingo, AbingoBuilder, TestOptions};
pub use identity::{Context, Identity};
pub use ledger::{BingoOptions, BingoTarget, ConversionOutcome, ConversionRecord};
pub use significance::SignificanceLevel;
