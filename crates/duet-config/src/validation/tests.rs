//! Tests for the full validation pipeline.

use super::*;

#[test]
fn default_config_validates() {
    let config = DuetConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_zero_max_missed() {
    let mut config = DuetConfig::default();
    config.heartbeat.max_missed = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("heartbeat.max_missed"));
}

#[test]
fn catches_tiny_readiness_timeout() {
    let mut config = DuetConfig::default();
    config.coordination.readiness_timeout_ms = 10;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("coordination.readiness_timeout_ms"));
}

#[test]
fn catches_ttl_shorter_than_reaper_interval() {
    let mut config = DuetConfig::default();
    config.reaper.room_ttl_secs = 5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("reaper.room_ttl_secs"));
}

#[test]
fn catches_empty_secret() {
    let mut config = DuetConfig::default();
    config.auth.jwt_secret.clear();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("auth.jwt_secret"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = DuetConfig::default();
    config.heartbeat.interval_secs = 0;
    config.server.outbound_buffer = 1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("heartbeat.interval_secs"));
    assert!(err.contains("server.outbound_buffer"));
    assert!(err.contains("; "));
}

#[test]
fn catches_shared_http_and_ws_port() {
    let mut config = DuetConfig::default();
    config.server.ws_port = config.server.port;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("server.ws_port"));
}
