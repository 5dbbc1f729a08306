pub mod errors;
pub mod id;
pub mod types;

pub use errors::{ConfigError, LicenseProblem, RelayError};
pub use id::{new_bet_id, new_correlation_id, Identity};
pub use types::{ConnId, ReasonCategory, Side, Slot};

pub type Result<T> = std::result::Result<T, RelayError>;
