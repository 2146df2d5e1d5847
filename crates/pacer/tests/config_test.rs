//! Tests for configuration loading.

use pacer::{Controller, DEFAULT_LIMIT_HEADER, PacerConfig, PacerErrorKind, from_config};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_bundled_defaults() {
    let config = PacerConfig::default();
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(
        config.retry.wait(),
        (Duration::from_millis(100), Duration::from_millis(400))
    );
    assert_eq!(
        config.retry.server_wait(),
        (Duration::from_millis(700), Duration::from_millis(900))
    );
    assert!(!config.retry.disabled);
    assert_eq!(config.rate_limit.limit_header, DEFAULT_LIMIT_HEADER);
    assert_eq!(config.transport.timeout_secs, 30);
    assert_eq!(config.transport.pool_max_idle_per_host, 10);
}

#[test]
fn test_load_merges_bundled_defaults() {
    let config = PacerConfig::load().unwrap();
    assert_eq!(config.rate_limit.reset_header, "X-RateLimit-Reset");
    assert!(config.transport.user_agent.is_some());
}

#[test]
fn test_from_file_overrides_and_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[retry]
max_retries = 1
wait_max_ms = 2000

[rate_limit]
limit_header = "RateLimit-Limit"

[transport]
timeout_secs = 0
user_agent = "reporting-bot/2.1"
"#
    )
    .unwrap();

    let config = PacerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.retry.max_retries, 1);
    assert_eq!(config.retry.wait_min_ms, 100);
    assert_eq!(config.retry.wait_max_ms, 2000);
    assert_eq!(config.rate_limit.limit_header, "RateLimit-Limit");
    assert_eq!(config.rate_limit.reset_header, "X-RateLimit-Reset");
    assert_eq!(config.transport.timeout_secs, 0);
    assert_eq!(
        config.transport.user_agent.as_deref(),
        Some("reporting-bot/2.1")
    );

    let controller = Controller::new("api.example.com", [from_config(&config)]).unwrap();
    assert_eq!(controller.transport().retry_max(), 1);
    assert_eq!(
        controller.transport().wait_bounds(),
        (Duration::from_millis(100), Duration::from_millis(2000))
    );
}

#[test]
fn test_missing_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PacerConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err.kind(), PacerErrorKind::Configuration(_)));
}

#[test]
fn test_malformed_values_are_rejected() {
    let err = PacerConfig::from_toml("[retry]\nmax_retries = \"many\"").unwrap_err();
    assert!(matches!(err.kind(), PacerErrorKind::Configuration(_)));
}

#[test]
fn test_inverted_window_fails_construction() {
    let config = PacerConfig::from_toml("[retry]\nwait_min_ms = 500\nwait_max_ms = 100").unwrap();
    let err = Controller::new("api.example.com", [from_config(&config)]).unwrap_err();
    assert!(matches!(err.kind(), PacerErrorKind::Configuration(_)));
}
