//! Connection identity.
//!
//! Identities are random UUID v4 values rather than counters, so they are not
//! predictable and do not repeat across process restarts.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix applied to every generated connection ID.
const PREFIX: &str = "conn_";

/// Unique identifier for one client connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Allocate a fresh random identity.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("{PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// Wrap an existing string (e.g. an ID echoed back by the engine).
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn ids_are_prefixed() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"));
        assert_eq!(id.as_str().len(), PREFIX.len() + 32);
    }

    #[test]
    fn ids_do_not_collide() {
        let ids: HashSet<ConnectionId> = (0..10_000).map(|_| ConnectionId::new()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ConnectionId::from("conn_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""conn_abc""#);
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_inner() {
        let id = ConnectionId::from_string("conn_42".into());
        assert_eq!(id.to_string(), "conn_42");
    }
}
