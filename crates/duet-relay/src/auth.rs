//! Token checks for agents, observers and control-API callers.
//!
//! Issuing tokens is somebody else's job; the relay only verifies them and
//! looks the resulting identity up in the license table.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use duet_common::{Identity, LicenseProblem, RelayError};
use duet_config::AuthConfig;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Turns a bearer token into the identity whose room it may join.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, token: &str) -> Result<Identity, RelayError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user: String,
    pub exp: u64,
}

/// HS256 verifier with an optional per-identity license end date.
pub struct JwtAuthorizer {
    key: DecodingKey,
    validation: Validation,
    enforce_licenses: bool,
    licenses: BTreeMap<String, NaiveDate>,
}

impl JwtAuthorizer {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            enforce_licenses: config.enforce_licenses,
            licenses: config.licenses.clone(),
        }
    }

    /// Same as [`Authorizer::authorize`] with an explicit "today".
    pub fn authorize_at(&self, token: &str, today: NaiveDate) -> Result<Identity, RelayError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                RelayError::AuthFailure
            })?;
        let user = data.claims.user;
        if user.is_empty() {
            return Err(RelayError::AuthFailure);
        }

        if self.enforce_licenses {
            match self.licenses.get(&user) {
                None => {
                    warn!(user = %user, "No license on file");
                    return Err(RelayError::LicenseInvalid(LicenseProblem::NoLicense));
                }
                Some(end) if today > *end => {
                    warn!(user = %user, end = %end, "License expired");
                    return Err(RelayError::LicenseInvalid(LicenseProblem::Expired));
                }
                Some(_) => {}
            }
        }
        Ok(Identity::new(user))
    }
}

impl Authorizer for JwtAuthorizer {
    fn authorize(&self, token: &str) -> Result<Identity, RelayError> {
        self.authorize_at(token, Utc::now().date_naive())
    }
}
