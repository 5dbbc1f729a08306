//! Configuration schema types for the duet relay.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod auth;
mod coordination;
mod heartbeat;
mod policy;
mod server;
mod system;

pub use auth::*;
pub use coordination::*;
pub use heartbeat::*;
pub use policy::*;
pub use server::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for the relay.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DuetConfig {
    pub server: ServerConfig,
    pub coordination: CoordinationConfig,
    pub heartbeat: HeartbeatConfig,
    pub reaper: ReaperConfig,
    pub auth: AuthConfig,
    pub policy: ReasonPolicy,
    pub logging: LoggingConfig,
}
