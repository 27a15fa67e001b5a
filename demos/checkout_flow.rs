//! Simulated checkout funnel with two experiments sharing a conversion.
//!
//! Run with: RUST_LOG=abingo=debug cargo run --example checkout_flow

use abingo::{Abingo, AlternativeSpec, BingoOptions, TestOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

const VISITORS: u64 = 5_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let abingo = Abingo::builder(
        abingo::experiment::MemoryExperimentStore::new(),
        abingo::cache::MemoryCache::new(),
    )
    .salt("checkout-demo")
    .build()?;

    let options = TestOptions::default().conversion("purchase");
    let mut purchases = 0_u64;

    for visitor in 0..VISITORS {
        let ctx = abingo.context(visitor);

        let layout = abingo.test(&ctx, "checkout_layout", ["one_page", "multi_step"], &options)?;
        let price: u32 = abingo.test_as(
            &ctx,
            "price_point",
            AlternativeSpec::weighted([(19, 1), (29, 1)]),
            &options,
        )?;

        // Deterministic stand-in for user behavior
        let mut threshold = if layout == "one_page" { 12 } else { 9 };
        if price == 19 {
            threshold += 3;
        }
        if visitor.wrapping_mul(2_654_435_761) % 100 < threshold {
            abingo.bingo(&ctx, "purchase", BingoOptions::default())?;
            purchases += 1;
        }
    }
    info!(visitors = VISITORS, purchases, "simulation finished");

    for experiment in abingo.experiments()? {
        println!("{} ({})", experiment.name(), experiment.significance_level()?);
        for alternative in experiment.alternatives() {
            println!(
                "  {:<12} {:>5} participants {:>4} conversions {:>6.2}%",
                alternative.content().to_string(),
                alternative.participants(),
                alternative.conversions(),
                alternative.conversion_rate() * 100.0,
            );
        }
        if let Some(best) = experiment.best_alternative() {
            println!("  leading: {}", best.content());
        }
        println!("  chi-squared: {:.3}", experiment.chi_squared()?);
    }
    Ok(())
}
