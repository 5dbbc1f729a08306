//! Full configuration validation.
//!
//! Validates numeric ranges and timing relationships, collecting every
//! problem into a single `ConfigError`.

mod helpers;

#[cfg(test)]
mod tests;

use crate::schema::DuetConfig;
use duet_common::ConfigError;

use helpers::validate_range;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &DuetConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_server(&mut errors, config);
    validate_coordination(&mut errors, config);
    validate_heartbeat(&mut errors, config);
    validate_auth(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_server(errors: &mut Vec<String>, config: &DuetConfig) {
    let server = &config.server;
    validate_range(errors, "server.hello_timeout_secs", server.hello_timeout_secs, 1, 300);
    validate_range(
        errors,
        "server.outbound_buffer",
        server.outbound_buffer as u64,
        8,
        65_536,
    );
    if server.port != 0 && server.port == server.ws_port {
        errors.push(format!(
            "server.port and server.ws_port must differ (both {})",
            server.port
        ));
    }
    if server.host.trim().is_empty() {
        errors.push("server.host must not be empty".into());
    }
}

fn validate_coordination(errors: &mut Vec<String>, config: &DuetConfig) {
    let c = &config.coordination;
    validate_range(
        errors,
        "coordination.readiness_timeout_ms",
        c.readiness_timeout_ms,
        100,
        60_000,
    );
    validate_range(
        errors,
        "coordination.dispatch_timeout_ms",
        c.dispatch_timeout_ms,
        100,
        120_000,
    );
    validate_range(errors, "coordination.settle_grace_ms", c.settle_grace_ms, 0, 60_000);
}

fn validate_heartbeat(errors: &mut Vec<String>, config: &DuetConfig) {
    validate_range(errors, "heartbeat.interval_secs", config.heartbeat.interval_secs, 1, 3600);
    validate_range(errors, "heartbeat.max_missed", config.heartbeat.max_missed as u64, 1, 10);
    validate_range(errors, "reaper.interval_secs", config.reaper.interval_secs, 1, 3600);
    if config.reaper.room_ttl_secs < config.reaper.interval_secs {
        errors.push(format!(
            "reaper.room_ttl_secs = {} must be at least reaper.interval_secs = {}",
            config.reaper.room_ttl_secs, config.reaper.interval_secs
        ));
    }
}

fn validate_auth(errors: &mut Vec<String>, config: &DuetConfig) {
    if config.auth.jwt_secret.is_empty() {
        errors.push("auth.jwt_secret must not be empty".into());
    }
}
