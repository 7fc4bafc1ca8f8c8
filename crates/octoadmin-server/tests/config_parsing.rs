use std::{env, fs, time::Duration};

use octoadmin_pipeline::FailurePolicy;
use octoadmin_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("octoadmin.toml");

    let toml_content = r#"
[logging]
level = "debug"

[pipeline]
failure_policy = "propagate_panics"

[pipeline.logging]
identity_lookup_timeout_ms = 25

[pipeline.performance]
warmup_executions = 10
warmup_period_secs = 30
warmup_threshold_ms = 1500
threshold_ms = 250

[cache]
default_ttl_secs = 300
sweep_interval_secs = 15

[presence]
channel_capacity = 64
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.pipeline.failure_policy, FailurePolicy::PropagatePanics);
    assert_eq!(cfg.pipeline.logging.identity_lookup_timeout_ms, 25);
    assert_eq!(cfg.pipeline.performance.warmup_executions, 10);
    assert_eq!(cfg.pipeline.performance.threshold_ms, 250);
    assert_eq!(
        cfg.cache.store_config().default_ttl,
        Some(Duration::from_secs(300))
    );
    assert_eq!(cfg.cache.sweep_interval_secs, 15);
    assert_eq!(cfg.presence.channel_capacity, 64);

    // 2) Env override should win over file
    unsafe {
        env::set_var("OCTOADMIN__CACHE__SWEEP_INTERVAL_SECS", "5");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.cache.sweep_interval_secs, 5);
    // cleanup env var
    unsafe {
        env::remove_var("OCTOADMIN__CACHE__SWEEP_INTERVAL_SECS");
    }

    // 3) Invalid config (warmup threshold below steady threshold) should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[pipeline.performance]
warmup_threshold_ms = 100
threshold_ms = 500
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("warmup_threshold_ms must be >="));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults are valid");
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.pipeline.failure_policy, FailurePolicy::Convert);
    assert_eq!(cfg.pipeline.performance.threshold_ms, 500);
    assert_eq!(cfg.cache.default_ttl_secs, None);
    assert_eq!(cfg.presence.channel_capacity, 256);
}
