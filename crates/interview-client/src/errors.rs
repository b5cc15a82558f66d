//! Session controller error types.
//!
//! Every failure the candidate can see is a `SessionError`. The text stored
//! in `Session::last_error` comes from [`SessionError::user_message`], which
//! never includes backend bodies, tokens or internal addresses.

use crate::controller::state::SessionStatus;
use crate::gateway::GatewayError;
use crate::room::{DisconnectReason, RoomError};

use std::time::Duration;
use thiserror::Error;

/// Session controller error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `POST /create-room` failed.
    #[error("Room creation failed: {0}")]
    RoomCreation(#[source] GatewayError),

    /// `POST /generate-token` failed.
    #[error("Credential request failed: {0}")]
    CredentialIssue(#[source] GatewayError),

    /// The media room rejected or aborted `connect`.
    #[error("Room connect failed: {0}")]
    Connect(#[source] RoomError),

    /// `connect` did not resolve in time.
    #[error("Room connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Local audio could not be published.
    #[error("Microphone publish failed: {0}")]
    Microphone(#[source] RoomError),

    /// The action requires a connected session.
    #[error("Session is not connected (status: {0})")]
    NotConnected(SessionStatus),

    /// The action requires a live room.
    #[error("No active room")]
    NoActiveRoom,

    /// The room was closed by something other than this client.
    #[error("Connection lost: {0}")]
    ConnectionLost(DisconnectReason),
}

impl SessionError {
    /// Text shown to the candidate and stored as `last_error`.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SessionError::RoomCreation(e) => format!("Room creation failed: {}", e.user_message()),
            SessionError::CredentialIssue(e) => {
                format!("Token generation failed: {}", e.user_message())
            }
            SessionError::Connect(e) => format!("Connection failed: {}", e.detail()),
            SessionError::ConnectTimeout(timeout) => {
                format!("Connection failed: timed out after {timeout:?}")
            }
            SessionError::Microphone(e) => format!("Microphone access denied: {}", e.detail()),
            SessionError::NotConnected(status) => {
                format!("Not connected to an interview room ({status})")
            }
            SessionError::NoActiveRoom => "Not connected to an interview room".to_string(),
            SessionError::ConnectionLost(reason) => format!("Connection lost: {reason}"),
        }
    }

    /// Bounded label for metrics.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            SessionError::RoomCreation(_) => "room_creation_failed",
            SessionError::CredentialIssue(_) => "credential_failed",
            SessionError::Connect(_) => "connect_failed",
            SessionError::ConnectTimeout(_) => "connect_timeout",
            SessionError::Microphone(_) => "microphone_failed",
            SessionError::NotConnected(_) => "not_connected",
            SessionError::NoActiveRoom => "no_active_room",
            SessionError::ConnectionLost(_) => "connection_lost",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_failures_hide_backend_details() {
        let err = SessionError::RoomCreation(GatewayError::Status {
            endpoint: "create-room",
            status: 500,
        });
        assert_eq!(
            err.user_message(),
            "Room creation failed: backend returned HTTP 500"
        );

        let err = SessionError::CredentialIssue(GatewayError::Http(
            "tcp connect error 10.1.2.3:8000".to_string(),
        ));
        assert_eq!(
            err.user_message(),
            "Token generation failed: backend unavailable"
        );
        assert!(!err.user_message().contains("10.1.2.3"));
    }

    #[test]
    fn test_connection_lost_uses_wire_code() {
        let err = SessionError::ConnectionLost(DisconnectReason::RoomDeleted);
        assert_eq!(err.user_message(), "Connection lost: ROOM_DELETED");
    }

    #[test]
    fn test_microphone_message() {
        let err = SessionError::Microphone(RoomError::PermissionDenied(
            "NotAllowedError".to_string(),
        ));
        assert_eq!(
            err.user_message(),
            "Microphone access denied: NotAllowedError"
        );

        let err = SessionError::Connect(RoomError::ConnectFailed("could not establish pc connection".into()));
        assert_eq!(
            err.user_message(),
            "Connection failed: could not establish pc connection"
        );
    }

    #[test]
    fn test_connect_timeout_message() {
        let err = SessionError::ConnectTimeout(Duration::from_secs(30));
        assert_eq!(err.user_message(), "Connection failed: timed out after 30s");

        let err = SessionError::ConnectTimeout(Duration::from_millis(250));
        assert_eq!(err.user_message(), "Connection failed: timed out after 250ms");
        assert_eq!(err.metric_label(), "connect_timeout");
    }

    #[test]
    fn test_not_connected_includes_status() {
        let err = SessionError::NotConnected(SessionStatus::Connecting);
        assert_eq!(
            err.user_message(),
            "Not connected to an interview room (connecting)"
        );
    }
}
