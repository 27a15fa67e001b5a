//! Tests for error types

use abingo::{AbingoConfig, AlternativeSpec, Error};

#[test]
fn test_unsupported_alternative_spec_error() {
    let error = Error::UnsupportedAlternativeSpec("null".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Unsupported alternative spec: null"));
    assert!(error_str.contains("Use a list"));
}

#[test]
fn test_invalid_alternative_spec_error() {
    let error = Error::InvalidAlternativeSpec("weight for \"a\" needed to be an integer".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid alternative spec"));
    assert!(error_str.contains("needed to be an integer"));
}

#[test]
fn test_no_alternatives_error() {
    let error = Error::NoAlternatives("checkout".to_string());
    assert_eq!(format!("{error}"), "Experiment 'checkout' has no alternatives");
}

#[test]
fn test_duplicate_experiment_error() {
    let error = Error::DuplicateExperiment("checkout".to_string());
    assert_eq!(format!("{error}"), "Experiment 'checkout' already exists");
}

#[test]
fn test_experiment_not_found_error() {
    let error = Error::ExperimentNotFound("checkout".to_string());
    assert_eq!(format!("{error}"), "Experiment 'checkout' not found");
}

#[test]
fn test_cache_error() {
    let error = Error::Cache("connection refused".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Cache error"));
    assert!(error_str.contains("connection refused"));
}

#[test]
fn test_store_error() {
    let error = Error::Store("deadlock detected".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Store error"));
    assert!(error_str.contains("deadlock detected"));
}

#[test]
fn test_config_error() {
    let error = AbingoConfig::from_json_str("{not json").unwrap_err();
    assert!(matches!(error, Error::Config(_)));
    assert!(format!("{error}").contains("Configuration error"));
}

#[test]
fn test_serialization_error_conversion() {
    let json_err = serde_json::from_str::<bool>("\"red\"").unwrap_err();
    let error: Error = json_err.into();
    assert!(matches!(error, Error::Serialization(_)));
    assert!(format!("{error}").contains("Serialization error"));
}

#[test]
fn test_unsupported_spec_from_json() {
    for value in [serde_json::json!(null), serde_json::json!(1.5), serde_json::json!("red")] {
        let error = AlternativeSpec::from_json(value).unwrap_err();
        assert!(matches!(error, Error::UnsupportedAlternativeSpec(_)), "{error}");
    }
}

#[test]
fn test_error_debug() {
    let error = Error::NoAlternatives("exp".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("NoAlternatives"));
}
