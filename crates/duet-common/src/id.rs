use serde::{Deserialize, Serialize};
use std::fmt;

pub fn new_correlation_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

/// Bet ids are scoped to the owning identity so log lines stay greppable.
pub fn new_bet_id(identity: &Identity) -> String {
    format!("{}_{}", identity, new_correlation_id())
}

/// The authenticated user a room belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_length() {
        let cid = new_correlation_id();
        assert_eq!(cid.len(), 8);
    }

    #[test]
    fn correlation_id_is_hex() {
        let cid = new_correlation_id();
        assert!(cid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn bet_id_is_prefixed_by_identity() {
        let id = Identity::new("alice");
        let bet = new_bet_id(&id);
        assert!(bet.starts_with("alice_"));
        assert_eq!(bet.len(), "alice_".len() + 8);
    }

    #[test]
    fn bet_ids_are_unique() {
        let id = Identity::new("alice");
        assert_ne!(new_bet_id(&id), new_bet_id(&id));
    }

    #[test]
    fn identity_serializes_as_plain_string() {
        let id = Identity::new("bob");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"bob\"");
        let back: Identity = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn identity_display() {
        assert_eq!(Identity::from("carol").to_string(), "carol");
    }
}
