use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `auth.jwt_secret`.
pub const JWT_SECRET_ENV: &str = "DUET_JWT_SECRET";

/// Token verification and license table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret shared with whatever issues access tokens.
    pub jwt_secret: String,
    /// Refuse identities without a current license.
    pub enforce_licenses: bool,
    /// identity -> last valid day (inclusive).
    pub licenses: BTreeMap<String, NaiveDate>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "INSECURE_DEV_SECRET_CHANGE_ME".into(),
            enforce_licenses: true,
            licenses: BTreeMap::new(),
        }
    }
}
