//! Facade behavior: experiment creation, consistent assignment,
//! participation and conversion counting.

use std::sync::Arc;

use abingo::cache::{Cache, CacheExt, CacheKey, MemoryCache};
use abingo::experiment::{Counter, ExperimentBackend, MemoryExperimentStore};
use abingo::{Abingo, AlternativeSpec, BingoOptions, ConversionOutcome, Error, TestOptions};
use serde_json::json;

fn defaults() -> TestOptions {
    TestOptions::default()
}

// =============================================================================
// Identity and creation
// =============================================================================

#[test]
fn test_identity_automatically_assigned() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.anonymous_context();
    assert!(!ctx.identity().as_str().is_empty());
    assert_eq!(ctx.salt(), abingo.config().salt);
}

#[test]
fn test_experiment_creation() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    assert_eq!(abingo.backend().experiment_count(), 0);
    assert_eq!(abingo.backend().alternative_count(), 0);

    let selected = abingo.test(&ctx, "unit_test_sample_A", ["A", "B"], &defaults()).unwrap();

    assert_eq!(abingo.backend().experiment_count(), 1);
    assert_eq!(abingo.backend().alternative_count(), 2);
    assert!(selected == "A" || selected == "B");
}

#[test]
fn test_creation_uses_distinct_content() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");

    abingo.test(&ctx, "dupes", ["A", "B", "A", "C", "A"], &defaults()).unwrap();

    let experiment = abingo.experiment("dupes").unwrap();
    assert_eq!(experiment.alternatives().len(), 3);
    assert_eq!(experiment.alternatives()[0].weight(), 3);
}

#[test]
fn test_later_specs_are_ignored() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");

    abingo.test(&ctx, "sticky", ["A", "B"], &defaults()).unwrap();
    let choice = abingo.test(&ctx, "sticky", ["X", "Y", "Z"], &defaults()).unwrap();

    assert!(choice == "A" || choice == "B");
    assert_eq!(abingo.backend().alternative_count(), 2);
}

#[test]
fn test_invalid_spec_fails_loudly() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");

    let err = abingo.test(&ctx, "empty", AlternativeSpec::Count(0), &defaults()).unwrap_err();

    assert!(matches!(err, Error::InvalidAlternativeSpec(_)));
    assert!(abingo.backend().is_empty());
}

// =============================================================================
// Assignment
// =============================================================================

#[test]
fn test_alternatives_picked_consistently() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");

    let picked = abingo.test(&ctx, "consistency_test", 1_i64..=100, &defaults()).unwrap();
    for _ in 0..100 {
        assert_eq!(picked, abingo.test(&ctx, "consistency_test", 1_i64..=100, &defaults()).unwrap());
    }
}

#[test]
fn test_assignment_survives_new_facade() {
    let backend = Arc::new(MemoryExperimentStore::new());
    let first = Abingo::new(Arc::clone(&backend), MemoryCache::new());
    let picked = first.test(&first.context("user-5"), "restart", 1_i64..=50, &defaults()).unwrap();

    // New process, empty cache, same store
    let second = Abingo::new(Arc::clone(&backend), MemoryCache::new());
    let again = second.test(&second.context("user-5"), "restart", 1_i64..=50, &defaults()).unwrap();

    assert_eq!(picked, again);
}

#[test]
fn test_assignment_is_known_md5_bucket() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");

    let choice = abingo.test(&ctx, "button_color", ["red", "green", "blue"], &defaults()).unwrap();

    // md5("Not really necessary.button_coloruser-1") % 3 == 2
    assert_eq!(choice, json!("blue"));
}

#[test]
fn test_salt_reshuffles_assignments() {
    let abingo = Abingo::in_memory();
    let spec = || AlternativeSpec::Count(1000);

    let moved = (0..50)
        .filter(|i| {
            let ctx = abingo.context(format!("user-{i}"));
            let before = abingo.test(&ctx, "reset_me", spec(), &defaults()).unwrap();
            let after = abingo
                .test(&ctx.clone().with_salt("second round"), "reset_me", spec(), &defaults())
                .unwrap();
            before != after
        })
        .count();

    assert!(moved > 40, "only {moved} of 50 users moved after a salt change");
}

#[test]
fn test_flip_returns_bool() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");

    let first = abingo.flip(&ctx, "show_banner").unwrap();
    assert_eq!(first, abingo.flip(&ctx, "show_banner").unwrap());

    let experiment = abingo.experiment("show_banner").unwrap();
    assert_eq!(experiment.alternatives().len(), 2);
}

#[test]
fn test_flip_on_non_boolean_experiment() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    abingo.test(&ctx, "colors", ["red", "blue"], &defaults()).unwrap();

    assert!(matches!(abingo.flip(&ctx, "colors"), Err(Error::Serialization(_))));
}

#[test]
fn test_test_as_typed() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");

    let n: u32 = abingo.test_as(&ctx, "page_size", AlternativeSpec::list([10, 20, 50]), &defaults()).unwrap();

    assert!([10, 20, 50].contains(&n));
}

// =============================================================================
// Participation
// =============================================================================

#[test]
fn test_participation_works() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    let names = ["participationA", "participationB", "participationC"];

    for name in names {
        abingo.test(&ctx, name, 1_i64..=5, &defaults()).unwrap();
    }

    assert_eq!(abingo.participating_tests(&ctx).unwrap(), names);
}

#[test]
fn test_participants_counted() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");

    let alternative = abingo.test(&ctx, "participants_counted_test", ["a", "b", "c"], &defaults()).unwrap();

    let experiment = abingo.experiment("participants_counted_test").unwrap();
    assert_eq!(experiment.participants(), 1);
    assert_eq!(experiment.alternative_for(&alternative).unwrap().participants(), 1);
}

#[test]
fn test_participation_counted_once() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");

    abingo.test(&ctx, "once", ["a", "b"], &defaults()).unwrap();
    abingo.test(&ctx, "once", ["a", "b"], &defaults()).unwrap();

    assert_eq!(abingo.experiment("once").unwrap().participants(), 1);
}

#[test]
fn test_multiple_participation() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    let options = TestOptions::default().multiple_participation();

    for _ in 0..3 {
        abingo.test(&ctx, "repeat", ["a", "b"], &options).unwrap();
    }

    assert_eq!(abingo.experiment("repeat").unwrap().participants(), 3);
    assert_eq!(abingo.participating_tests(&ctx).unwrap(), vec!["repeat"]);
}

#[test]
fn test_distinct_users_each_counted() {
    let abingo = Abingo::in_memory();

    for i in 0..20 {
        let ctx = abingo.context(format!("user-{i}"));
        abingo.test(&ctx, "crowd", ["a", "b"], &defaults()).unwrap();
    }

    assert_eq!(abingo.experiment("crowd").unwrap().participants(), 20);
}

// =============================================================================
// Conversions
// =============================================================================

#[test]
fn test_conversion_tracking_by_test_name() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    let name = "conversion_test_by_name";

    let alternative = abingo.test(&ctx, name, ["a", "b", "c"], &defaults()).unwrap();
    abingo.bingo(&ctx, name, BingoOptions::default()).unwrap();

    let experiment = abingo.experiment(name).unwrap();
    assert_eq!(experiment.conversions(), 1);
    assert_eq!(experiment.alternative_for(&alternative).unwrap().conversions(), 1);

    // Not double counted without multiple_conversions
    let records = abingo.bingo(&ctx, name, BingoOptions::default()).unwrap();
    assert_eq!(records[0].outcome, ConversionOutcome::AlreadyConverted);
    assert_eq!(abingo.experiment(name).unwrap().conversions(), 1);
}

#[test]
fn test_multiple_conversions() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    abingo.test(&ctx, "repeat_buyer", ["a", "b"], &defaults()).unwrap();

    for _ in 0..3 {
        abingo.bingo(&ctx, "repeat_buyer", BingoOptions::default().multiple_conversions()).unwrap();
    }

    let experiment = abingo.experiment("repeat_buyer").unwrap();
    assert_eq!(experiment.conversions(), 3);
    let key = CacheKey::Conversions {
        identity: "user-1",
        name: "repeat_buyer",
        generation: experiment.record().generation(),
    }
    .render("abingo");
    assert_eq!(abingo.cache().read_json::<u64>(&key).unwrap(), Some(3));
}

#[test]
fn test_conversion_tracking_by_conversion_name() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    let tests = [
        "conversionTrackingByConversionNameA",
        "conversionTrackingByConversionNameB",
        "conversionTrackingByConversionNameC",
    ];
    let options = TestOptions::default().conversion("purchase");

    for name in tests {
        abingo.test(&ctx, name, ["A", "B"], &options).unwrap();
    }
    let records = abingo.bingo(&ctx, "purchase", BingoOptions::default()).unwrap();

    assert_eq!(records.len(), 3);
    for name in tests {
        assert_eq!(abingo.experiment(name).unwrap().conversions(), 1);
    }
}

#[test]
fn test_conversion_name_only_converts_participated_experiments() {
    let abingo = Abingo::in_memory();
    let options = TestOptions::default().conversion("signup");
    let alice = abingo.context("alice");
    let bob = abingo.context("bob");

    abingo.test(&alice, "hero_image", ["cat", "dog"], &options).unwrap();
    abingo.test(&bob, "cta_text", ["Join", "Start"], &options).unwrap();

    let records = abingo.bingo(&alice, "signup", BingoOptions::default()).unwrap();

    let recorded: Vec<_> = records
        .iter()
        .filter(|r| r.outcome == ConversionOutcome::Recorded)
        .map(|r| r.experiment.as_str())
        .collect();
    assert_eq!(recorded, vec!["hero_image"]);
    assert_eq!(abingo.experiment("cta_text").unwrap().conversions(), 0);
}

#[test]
fn test_conversion_name_survives_cache_clear() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    let options = TestOptions::default().conversion("purchase");
    abingo.test(&ctx, "checkout_a", ["A", "B"], &options).unwrap();
    abingo.test(&ctx, "checkout_b", ["A", "B"], &options).unwrap();

    abingo.cache().clear().unwrap();

    // The user's participation list is gone, so assume it
    let records = abingo
        .bingo(&ctx, "purchase", BingoOptions::default().assume_participation())
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.outcome == ConversionOutcome::Recorded));
}

#[test]
fn test_bingo_all_participating() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    abingo.test(&ctx, "first", ["a", "b"], &defaults()).unwrap();
    abingo.test(&ctx, "second", ["a", "b"], &defaults()).unwrap();

    let records = abingo.bingo(&ctx, None::<&str>, BingoOptions::default()).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(abingo.experiment("first").unwrap().conversions(), 1);
    assert_eq!(abingo.experiment("second").unwrap().conversions(), 1);
}

#[test]
fn test_bingo_list_of_names() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    abingo.test(&ctx, "one", ["a", "b"], &defaults()).unwrap();
    abingo.test(&ctx, "two", ["a", "b"], &defaults()).unwrap();
    abingo.test(&ctx, "three", ["a", "b"], &defaults()).unwrap();

    let records = abingo.bingo(&ctx, ["one", "three"], BingoOptions::default()).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(abingo.experiment("one").unwrap().conversions(), 1);
    assert_eq!(abingo.experiment("two").unwrap().conversions(), 0);
    assert_eq!(abingo.experiment("three").unwrap().conversions(), 1);
}

#[test]
fn test_bingo_without_participation_is_ignored() {
    let abingo = Abingo::in_memory();
    let participant = abingo.context("participant");
    let stranger = abingo.context("stranger");
    abingo.test(&participant, "gated", ["a", "b"], &defaults()).unwrap();

    let records = abingo.bingo(&stranger, "gated", BingoOptions::default()).unwrap();

    assert_eq!(records[0].outcome, ConversionOutcome::NotParticipating);
    assert_eq!(abingo.experiment("gated").unwrap().conversions(), 0);
}

#[test]
fn test_conversion_keys_do_not_collide_across_names() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    abingo.test(&ctx, "promo", ["a", "b"], &defaults()).unwrap();
    abingo.test(&ctx, "promo_banner", ["a", "b"], &defaults()).unwrap();

    abingo.bingo(&ctx, "promo", BingoOptions::default()).unwrap();
    let records = abingo.bingo(&ctx, "promo_banner", BingoOptions::default()).unwrap();

    assert_eq!(records[0].outcome, ConversionOutcome::Recorded);
}

// =============================================================================
// Lifecycle and reporting
// =============================================================================

#[test]
fn test_end_experiment() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    abingo.test(&ctx, "short_lived", ["a", "b"], &defaults()).unwrap();

    assert!(abingo.end_experiment("short_lived").unwrap());

    assert!(matches!(abingo.experiment("short_lived"), Err(Error::ExperimentNotFound(_))));
    let records = abingo.bingo(&ctx, "short_lived", BingoOptions::default()).unwrap();
    assert_eq!(records[0].outcome, ConversionOutcome::UnknownExperiment);

    // Restarting with new alternatives uses the new alternatives
    let choice = abingo.test(&ctx, "short_lived", ["x", "y"], &defaults()).unwrap();
    assert!(choice == "x" || choice == "y");

    // The returning user is counted into the new incarnation
    let restarted = abingo.experiment("short_lived").unwrap();
    assert_eq!(restarted.participants(), 1);
    assert_eq!(abingo.participating_tests(&ctx).unwrap(), vec!["short_lived"]);

    let records = abingo.bingo(&ctx, "short_lived", BingoOptions::default()).unwrap();
    assert_eq!(records[0].outcome, ConversionOutcome::Recorded);
    assert_eq!(abingo.experiment("short_lived").unwrap().conversions(), 1);
}

#[test]
fn test_conversion_after_restart() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    abingo.test(&ctx, "rerun", ["a", "b"], &defaults()).unwrap();
    abingo.bingo(&ctx, "rerun", BingoOptions::default()).unwrap();
    assert_eq!(abingo.experiment("rerun").unwrap().conversions(), 1);

    abingo.end_experiment("rerun").unwrap();
    assert!(abingo.participating_tests(&ctx).unwrap().is_empty());

    abingo.test(&ctx, "rerun", ["a", "b"], &defaults()).unwrap();
    let records = abingo.bingo(&ctx, "rerun", BingoOptions::default()).unwrap();
    assert_eq!(records[0].outcome, ConversionOutcome::Recorded);

    let experiment = abingo.experiment("rerun").unwrap();
    assert_eq!(experiment.participants(), 1);
    assert_eq!(experiment.conversions(), 1);
}

#[test]
fn test_restart_without_conversion_name_stops_listening() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    let purchase = TestOptions::default().conversion("purchase");
    abingo.test(&ctx, "banner", ["a", "b"], &purchase).unwrap();
    abingo.test(&ctx, "pricing", ["low", "high"], &purchase).unwrap();

    abingo.end_experiment("banner").unwrap();
    abingo.test(&ctx, "banner", ["a", "b"], &defaults()).unwrap();

    let records = abingo.bingo(&ctx, "purchase", BingoOptions::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].experiment, "pricing");
    assert_eq!(records[0].outcome, ConversionOutcome::Recorded);
    assert_eq!(abingo.experiment("banner").unwrap().conversions(), 0);
}

#[test]
fn test_experiments_listing() {
    let abingo = Abingo::in_memory();
    let ctx = abingo.context("user-1");
    abingo.test(&ctx, "zeta", ["a", "b"], &defaults()).unwrap();
    abingo.test(&ctx, "alpha", ["a", "b"], &defaults()).unwrap();

    let names: Vec<_> = abingo
        .experiments()
        .unwrap()
        .iter()
        .map(|e| e.name().to_string())
        .collect();

    assert_eq!(names, vec!["alpha", "zeta"]);
}

#[test]
fn test_reporting_on_equal_arms() {
    let abingo = Abingo::in_memory();

    for i in 0..200 {
        let ctx = abingo.context(format!("visitor-{i}"));
        abingo.test(&ctx, "report", ["a", "b"], &defaults()).unwrap();
    }
    let experiment = abingo.experiment("report").unwrap();

    assert_eq!(experiment.participants(), 200);
    assert_eq!(experiment.conversions(), 0);
    assert!(experiment.chi_squared().unwrap().abs() < 1e-12);
    assert_eq!(experiment.significance_level().unwrap(), abingo::SignificanceLevel::None);
    assert!(experiment.best_alternative().is_some());
}

#[test]
fn test_key_prefix_isolates_facades() {
    let cache = Arc::new(MemoryCache::new());
    let shop = Abingo::builder(MemoryExperimentStore::new(), Arc::clone(&cache))
        .key_prefix("shop")
        .build()
        .unwrap();
    let blog = Abingo::builder(MemoryExperimentStore::new(), Arc::clone(&cache))
        .key_prefix("blog")
        .build()
        .unwrap();

    shop.test(&shop.context("u"), "layout", ["a", "b"], &defaults()).unwrap();

    assert_eq!(blog.participating_tests(&blog.context("u")).unwrap(), Vec::<String>::new());
    assert!(cache.exists(&CacheKey::Exists("layout").render("shop")).unwrap());
    assert!(!cache.exists(&CacheKey::Exists("layout").render("blog")).unwrap());
}

#[test]
fn test_concurrent_first_callers() {
    let abingo = Abingo::in_memory();

    std::thread::scope(|scope| {
        for t in 0..8 {
            let abingo = &abingo;
            scope.spawn(move || {
                for i in 0..25 {
                    let ctx = abingo.context(format!("thread-{t}-user-{i}"));
                    abingo.test(&ctx, "stampede", ["a", "b", "c"], &defaults()).unwrap();
                }
            });
        }
    });

    assert_eq!(abingo.backend().experiment_count(), 1);
    assert_eq!(abingo.backend().alternative_count(), 3);
    assert_eq!(abingo.backend().sum("stampede", Counter::Participants).unwrap(), 200);
}
