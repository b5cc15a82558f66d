//! Media room capability interface.
//!
//! The realtime transport (session negotiation, media, reconnection) lives in
//! an external library. This module defines the surface the session
//! controller consumes from it:
//!
//! - [`RoomConnector`] constructs a room together with its event receiver,
//!   so subscriptions exist before `connect` is called
//! - [`MediaRoom`] is the live transport object
//! - [`AudioPlayback`] attaches subscribed remote audio for local playback
//! - [`RoomHandle`] owns one room and guarantees its release
//!
//! # Modules
//!
//! - [`handle`] - Scoped ownership of a live room
//! - [`mock`] - In-process implementations for tests
//! - `livekit` - LiveKit adapter (cargo feature `livekit`)

pub mod handle;
#[cfg(feature = "livekit")]
pub mod livekit;
pub mod mock;

pub use handle::RoomHandle;

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::ParticipantIdentity;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default capture width for local video.
pub const DEFAULT_CAPTURE_WIDTH: u32 = 1280;

/// Default capture height for local video.
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 720;

/// Receiving side of a room's event stream.
pub type RoomEventReceiver = mpsc::UnboundedReceiver<RoomEvent>;

/// Sending side of a room's event stream (held by room implementations).
pub type RoomEventSender = mpsc::UnboundedSender<RoomEvent>;

/// Errors reported by the media room or playback collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// Signaling or transport connection failed.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// The user or platform denied device access.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Capture device missing or failing.
    #[error("Device error: {0}")]
    Device(String),

    /// Track publication rejected.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Remote audio could not be played back.
    #[error("Playback failed: {0}")]
    Playback(String),

    /// The transport failed while closing or running.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The room was already closed.
    #[error("Room is closed")]
    Closed,
}

impl RoomError {
    /// The underlying reason without the variant prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            RoomError::ConnectFailed(reason)
            | RoomError::PermissionDenied(reason)
            | RoomError::Device(reason)
            | RoomError::PublishFailed(reason)
            | RoomError::Playback(reason)
            | RoomError::Transport(reason) => reason,
            RoomError::Closed => "room is closed",
        }
    }
}

/// Capture resolution requested from the media library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoResolution {
    pub width: u32,
    pub height: u32,
}

/// Options passed to the media library when a room is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomOptions {
    /// Subscribe to remote video at a quality matched to the rendered size.
    pub adaptive_stream: bool,
    /// Pause publishing of simulcast layers nobody subscribes to.
    pub dynacast: bool,
    /// Capture resolution for local video tracks.
    pub video_capture_resolution: VideoResolution,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            adaptive_stream: true,
            dynacast: true,
            video_capture_resolution: VideoResolution {
                width: DEFAULT_CAPTURE_WIDTH,
                height: DEFAULT_CAPTURE_HEIGHT,
            },
        }
    }
}

/// Transport-level connection state as reported by the media library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        })
    }
}

/// Reason code carried by a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Our own `disconnect()` call.
    ClientInitiated,
    DuplicateIdentity,
    ServerShutdown,
    ParticipantRemoved,
    RoomDeleted,
    StateMismatch,
    JoinFailure,
    /// A code this client does not know.
    Other(String),
}

impl DisconnectReason {
    /// Parse a wire code such as `ROOM_DELETED`.
    #[must_use]
    pub fn from_wire_code(code: &str) -> Self {
        match code {
            "CLIENT_INITIATED" => DisconnectReason::ClientInitiated,
            "DUPLICATE_IDENTITY" => DisconnectReason::DuplicateIdentity,
            "SERVER_SHUTDOWN" => DisconnectReason::ServerShutdown,
            "PARTICIPANT_REMOVED" => DisconnectReason::ParticipantRemoved,
            "ROOM_DELETED" => DisconnectReason::RoomDeleted,
            "STATE_MISMATCH" => DisconnectReason::StateMismatch,
            "JOIN_FAILURE" => DisconnectReason::JoinFailure,
            other => DisconnectReason::Other(other.to_string()),
        }
    }

    /// Whether the disconnect was caused by this client.
    #[must_use]
    pub fn is_client_initiated(&self) -> bool {
        matches!(self, DisconnectReason::ClientInitiated)
    }

    /// Bounded label for metrics (`other` for unknown codes).
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            DisconnectReason::ClientInitiated => "client_initiated",
            DisconnectReason::DuplicateIdentity => "duplicate_identity",
            DisconnectReason::ServerShutdown => "server_shutdown",
            DisconnectReason::ParticipantRemoved => "participant_removed",
            DisconnectReason::RoomDeleted => "room_deleted",
            DisconnectReason::StateMismatch => "state_mismatch",
            DisconnectReason::JoinFailure => "join_failure",
            DisconnectReason::Other(_) => "other",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientInitiated => f.write_str("CLIENT_INITIATED"),
            DisconnectReason::DuplicateIdentity => f.write_str("DUPLICATE_IDENTITY"),
            DisconnectReason::ServerShutdown => f.write_str("SERVER_SHUTDOWN"),
            DisconnectReason::ParticipantRemoved => f.write_str("PARTICIPANT_REMOVED"),
            DisconnectReason::RoomDeleted => f.write_str("ROOM_DELETED"),
            DisconnectReason::StateMismatch => f.write_str("STATE_MISMATCH"),
            DisconnectReason::JoinFailure => f.write_str("JOIN_FAILURE"),
            DisconnectReason::Other(code) => f.write_str(code),
        }
    }
}

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A remote participant as seen by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub identity: ParticipantIdentity,
}

/// A subscribed remote track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub sid: String,
    pub kind: TrackKind,
}

/// Publication metadata for a subscribed track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPublication {
    pub sid: String,
    pub name: String,
}

/// Events emitted by a media room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Connected,
    Disconnected {
        reason: DisconnectReason,
    },
    ConnectionStateChanged(ConnectionState),
    ParticipantConnected(RemoteParticipant),
    TrackSubscribed {
        track: RemoteTrack,
        publication: TrackPublication,
        participant: RemoteParticipant,
    },
}

/// A live realtime-transport room.
#[async_trait]
pub trait MediaRoom: Send + Sync {
    /// Connect to the media server. Resolves once connected or failed.
    async fn connect(&self, url: &str, token: &SecretString) -> Result<(), RoomError>;

    /// Leave the room and close the transport.
    async fn disconnect(&self) -> Result<(), RoomError>;

    /// Publish local capture tracks for the local participant.
    async fn enable_camera_and_microphone(&self, video: bool, audio: bool)
        -> Result<(), RoomError>;
}

/// Constructs media rooms.
pub trait RoomConnector: Send + Sync {
    /// Create a room and the receiver for all of its events.
    fn create_room(&self, options: &RoomOptions) -> (Arc<dyn MediaRoom>, RoomEventReceiver);
}

/// Local playback of subscribed remote audio.
#[async_trait]
pub trait AudioPlayback: Send + Sync {
    /// Attach the track to an output and start playing it.
    async fn attach(
        &self,
        track: &RemoteTrack,
        participant: &RemoteParticipant,
    ) -> Result<(), RoomError>;
}
