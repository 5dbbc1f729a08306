//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Duet Relay Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[server]
# host = "0.0.0.0"
# port = 3000                  # HTTP control API
# ws_port = 3001                # agent/observer WebSocket
# hello_timeout_secs = 10       # 1-300
# outbound_buffer = 256         # 8-65536

[coordination]
# readiness_timeout_ms = 5000   # 100-60000
# dispatch_timeout_ms = 10000   # 100-120000
# settle_grace_ms = 2000        # 0-60000

[heartbeat]
# interval_secs = 30            # 1-3600
# max_missed = 2                # 1-10

[reaper]
# interval_secs = 60            # 1-3600
# room_ttl_secs = 600

[auth]
# jwt_secret = "..."            # or set DUET_JWT_SECRET
# enforce_licenses = true

[auth.licenses]
# alice = "2026-12-31"

[policy]
# default = "hard"              # hard, soft

[policy.reasons]
# not_betting_time = "soft"

[logging]
# level = "info"                # trace, debug, info, warn, error
"##
    .to_string()
}
