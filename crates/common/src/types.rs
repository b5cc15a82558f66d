//! Common data types for the interview client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of an interview room as issued by the backend (e.g. `interview-4k2p9x0abc1d`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Wrap a backend-issued room name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the room name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the backend returned an empty name.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identity of a participant in a room (local candidate or remote agent).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantIdentity(String);

impl ParticipantIdentity {
    /// Wrap a participant identity.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Borrow the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_room_name_is_transparent_in_json() {
        let name: RoomName = serde_json::from_str(r#""interview-abc123""#).unwrap();
        assert_eq!(name.as_str(), "interview-abc123");
        assert_eq!(serde_json::to_string(&name).unwrap(), r#""interview-abc123""#);
    }

    #[test]
    fn test_room_name_empty_detection() {
        assert!(RoomName::new("").is_empty());
        assert!(RoomName::new("   ").is_empty());
        assert!(!RoomName::new("interview-1").is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(RoomName::from("interview-x").to_string(), "interview-x");
        assert_eq!(ParticipantIdentity::from("agent-7").to_string(), "agent-7");
    }
}
