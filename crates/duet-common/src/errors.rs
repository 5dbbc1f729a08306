use std::path::PathBuf;

use crate::types::Slot;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Why a license check refused an otherwise valid identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseProblem {
    NoLicense,
    Expired,
}

impl LicenseProblem {
    /// Stable code sent to clients alongside the human-readable message.
    pub fn code(self) -> &'static str {
        match self {
            LicenseProblem::NoLicense => "no_license",
            LicenseProblem::Expired => "license_expired",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid or missing token")]
    AuthFailure,

    #[error("{}", license_message(*.0))]
    LicenseInvalid(LicenseProblem),

    #[error("both agent slots are occupied")]
    SlotsExhausted,

    #[error("a bet is already in progress, wait for it to complete")]
    SessionAlreadyInProgress,

    #[error("one or both agents are not connected")]
    AgentsNotConnected,

    #[error("{0} is not connected")]
    AgentNotConnected(Slot),

    #[error("{slot} is not ready: {reason}")]
    AgentNotReady { slot: Slot, reason: String },

    #[error("{slot} failed to place bet: {reason}")]
    AgentActionFailed { slot: Slot, reason: String },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("coordinator unavailable")]
    CoordinatorGone,
}

impl RelayError {
    /// HTTP status used when this error rejects a control request.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::AuthFailure => 401,
            RelayError::LicenseInvalid(_) => 403,
            RelayError::AgentsNotConnected | RelayError::AgentNotConnected(_) => 404,
            RelayError::SessionAlreadyInProgress => 409,
            RelayError::InvalidMessage(_) => 400,
            RelayError::SlotsExhausted => 409,
            RelayError::AgentNotReady { .. } | RelayError::AgentActionFailed { .. } => 422,
            RelayError::Io(_) | RelayError::CoordinatorGone => 503,
        }
    }

    /// Machine-readable code for the `error` wire message, if any.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            RelayError::LicenseInvalid(problem) => Some(problem.code()),
            RelayError::AuthFailure => Some("invalid_token"),
            RelayError::SlotsExhausted => Some("slots_exhausted"),
            _ => None,
        }
    }
}

fn license_message(problem: LicenseProblem) -> &'static str {
    match problem {
        LicenseProblem::NoLicense => {
            "No license found. Please contact administrator to purchase a license."
        }
        LicenseProblem::Expired => {
            "License expired. Please contact administrator to renew your license."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("heartbeat.max_missed = 0".into());
        assert_eq!(
            err.to_string(),
            "config validation error: heartbeat.max_missed = 0"
        );
    }

    #[test]
    fn status_codes_match_control_api() {
        assert_eq!(RelayError::AgentsNotConnected.status_code(), 404);
        assert_eq!(RelayError::AgentNotConnected(Slot::B).status_code(), 404);
        assert_eq!(RelayError::SessionAlreadyInProgress.status_code(), 409);
        assert_eq!(RelayError::AuthFailure.status_code(), 401);
        assert_eq!(
            RelayError::LicenseInvalid(LicenseProblem::Expired).status_code(),
            403
        );
    }

    #[test]
    fn slot_appears_in_message() {
        let err = RelayError::AgentNotConnected(Slot::A);
        assert_eq!(err.to_string(), "PC1 is not connected");

        let err = RelayError::AgentActionFailed {
            slot: Slot::B,
            reason: "chip disabled".into(),
        };
        assert_eq!(err.to_string(), "PC2 failed to place bet: chip disabled");
    }

    #[test]
    fn license_errors_carry_codes() {
        let err = RelayError::LicenseInvalid(LicenseProblem::NoLicense);
        assert_eq!(err.code(), Some("no_license"));
        assert!(err.to_string().contains("No license found"));

        let err = RelayError::LicenseInvalid(LicenseProblem::Expired);
        assert_eq!(err.code(), Some("license_expired"));
        assert!(err.to_string().contains("License expired"));
    }

    #[test]
    fn io_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: RelayError = io_err.into();
        assert!(matches!(err, RelayError::Io(_)));
        assert!(err.to_string().contains("port taken"));
    }
}
