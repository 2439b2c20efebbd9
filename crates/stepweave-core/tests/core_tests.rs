//! Tests for stepweave-core: vectors, configuration, ticks, errors

use stepweave_core::*;
use std::io::Write;

// ===========================================================================
// StateVector
// ===========================================================================

#[test]
fn state_vector_rejects_non_finite() {
    let err = StateVector::new(vec![1.0, f64::NAN]).unwrap_err();
    assert!(matches!(err, Error::NonFinite { index: 1, .. }));
    assert!(err.is_validation());

    let err = StateVector::new(vec![f64::INFINITY]).unwrap_err();
    assert!(matches!(err, Error::NonFinite { index: 0, .. }));
}

#[test]
fn state_vector_rejects_empty() {
    assert!(matches!(StateVector::new(vec![]), Err(Error::EmptyVector)));
}

#[test]
fn state_vector_norm_and_distance() {
    let a = StateVector::new(vec![3.0, 4.0]).unwrap();
    let b = StateVector::new(vec![0.0, 0.0]).unwrap();
    assert!((a.norm() - 5.0).abs() < 1e-12);
    assert_eq!(a.distance(&b), Some(5.0));

    let c = StateVector::new(vec![1.0, 2.0, 3.0]).unwrap();
    assert_eq!(a.distance(&c), None);
}

#[test]
fn state_vector_unit_and_dominant_axis() {
    let e1 = StateVector::unit(3, 1).unwrap();
    assert_eq!(e1.as_slice(), &[0.0, 1.0, 0.0]);
    assert!(StateVector::unit(3, 3).is_err());

    let v = StateVector::new(vec![0.1, -0.7, 0.3]).unwrap();
    assert_eq!(v.dominant_axis(), 1);
}

#[test]
fn state_vector_add_scaled_checks_dimension() {
    let a = StateVector::new(vec![1.0, 1.0]).unwrap();
    let b = StateVector::new(vec![2.0, -2.0]).unwrap();
    let sum = a.add_scaled(&b, 0.5).unwrap();
    assert_eq!(sum.as_slice(), &[2.0, 0.0]);

    let c = StateVector::new(vec![1.0]).unwrap();
    assert!(matches!(
        a.add_scaled(&c, 1.0),
        Err(Error::DimensionMismatch { expected: 2, got: 1 })
    ));
}

#[test]
fn state_vector_add_scaled_rejects_overflow() {
    let a = StateVector::new(vec![f64::MAX]).unwrap();
    assert!(a.add_scaled(&a, 2.0).is_err());
}

#[test]
fn state_vector_cosine() {
    let a = StateVector::new(vec![1.0, 0.0]).unwrap();
    let b = StateVector::new(vec![0.0, 2.0]).unwrap();
    let z = StateVector::zeros(2).unwrap();
    assert!(a.cosine(&b).abs() < 1e-12);
    assert!((a.cosine(&a) - 1.0).abs() < 1e-12);
    assert_eq!(a.cosine(&z), 0.0);
}

#[test]
fn state_vector_serde_validates() {
    let v: StateVector = serde_json::from_str("[0.5, 1.5]").unwrap();
    assert_eq!(v.dim(), 2);
    assert_eq!(serde_json::to_string(&v).unwrap(), "[0.5,1.5]");
    assert!(serde_json::from_str::<StateVector>("[]").is_err());
}

// ===========================================================================
// Configuration
// ===========================================================================

#[test]
fn default_config_is_valid() {
    StepweaveConfig::default().validate().unwrap();
}

#[test]
fn config_toml_roundtrip() {
    let mut config = StepweaveConfig::default();
    config.agent.max_depth = 3;
    config.journal.auth_secret = Some("k".into());
    let text = config.to_toml();
    let back: StepweaveConfig = toml::from_str(&text).unwrap();
    assert_eq!(back.agent.max_depth, 3);
    assert_eq!(back.journal.auth_secret.as_deref(), Some("k"));
}

#[test]
fn config_load_partial_file_fills_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[kernel]\nstrict = true\n\n[agent]\nmax_paths = 10").unwrap();
    let config = StepweaveConfig::load(file.path());
    assert!(config.kernel.strict);
    assert_eq!(config.agent.max_paths, 10);
    assert_eq!(config.watcher.window_size, WatcherConfig::default().window_size);
}

#[test]
fn config_load_missing_or_malformed_falls_back() {
    let config = StepweaveConfig::load(std::path::Path::new("/nonexistent/stepweave.toml"));
    assert_eq!(config.agent.max_depth, AgentConfig::default().max_depth);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "this is = = not toml").unwrap();
    let config = StepweaveConfig::load(file.path());
    assert_eq!(config.kernel.rho, KernelConfig::default().rho);
}

#[test]
fn config_validate_rejects_bad_values() {
    let mut config = StepweaveConfig::default();
    config.kernel.rho = 1.5;
    assert!(matches!(
        config.validate(),
        Err(Error::ParamOutOfRange { name: "rho", .. })
    ));

    let mut config = StepweaveConfig::default();
    config.agent.depth_ceiling = 9;
    assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

    let mut config = StepweaveConfig::default();
    config.watcher.max_decay_rate = 1.0;
    assert!(config.validate().is_err());

    let mut config = StepweaveConfig::default();
    config.agent.ghost_after = config.agent.consolidate_after;
    assert!(config.validate().is_err());
}

// ===========================================================================
// Ticks
// ===========================================================================

#[test]
fn tick_deserializes_without_optional_fields() {
    let tick: Tick =
        serde_json::from_str(r#"{"sequence_id": 4, "tag": "alpha", "integrity_hash": "ab"}"#)
            .unwrap();
    assert_eq!(tick.sequence_id, 4);
    assert!(tick.auth_tag.is_none());
}

#[test]
fn tick_new_hashes_tag() {
    let tick = Tick::new(1, "alpha");
    assert_eq!(tick.integrity_hash, sha256_hex(b"alpha"));
}

#[test]
fn tick_auth_helper_matches_signed() {
    let tick = Tick::new(9, "beta");
    let tag = tick_auth_tag("secret", &tick);
    let signed = tick.clone().signed("secret");
    assert_eq!(signed.auth_tag.as_deref(), Some(tag.as_str()));
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn error_display_messages() {
    let e = Error::param_out_of_range("lambda", 2.0, 0.0, 1.0);
    assert!(e.to_string().contains("lambda"));
    let e = Error::SequenceRejected { got: 5, last: 5 };
    assert_eq!(e.to_string(), "sequence 5 rejected: last accepted 5");
    assert!(!Error::auth_failed("x").is_validation());
}
