//! Media room event translation.
//!
//! `translate` maps each [`RoomEvent`] to a [`Transition`]: the status to
//! move to, the error to record, the log lines to append and whether a track
//! must be attached for playback. It has no side effects, so the whole table
//! is covered by unit tests without a transport.

use super::state::{Session, SessionStatus};
use crate::errors::SessionError;
use crate::room::{ConnectionState, RemoteParticipant, RemoteTrack, RoomEvent, TrackKind};

/// Effect of one room event on the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub status: Option<SessionStatus>,
    pub last_error: Option<String>,
    pub log: Vec<String>,
    /// Remote audio to attach for playback.
    pub playback: Option<(RemoteTrack, RemoteParticipant)>,
}

impl Transition {
    /// Whether the event has no visible effect.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.last_error.is_none()
            && self.log.is_empty()
            && self.playback.is_none()
    }

    /// Apply status and error to the session; returns the log lines.
    pub fn apply(&self, session: &mut Session) -> Vec<String> {
        if let Some(status) = self.status {
            session.status = status;
            if status != SessionStatus::Connected {
                session.microphone_enabled = false;
            }
        }
        if let Some(error) = &self.last_error {
            session.last_error = Some(error.clone());
        }
        self.log.clone()
    }
}

/// Translate a room event.
#[must_use]
pub fn translate(event: &RoomEvent) -> Transition {
    match event {
        RoomEvent::Connected => Transition {
            status: Some(SessionStatus::Connected),
            log: vec!["Connected to interview room".to_string()],
            ..Transition::default()
        },
        RoomEvent::Disconnected { reason } => Transition {
            status: Some(SessionStatus::Disconnected),
            last_error: (!reason.is_client_initiated())
                .then(|| SessionError::ConnectionLost(reason.clone()).user_message()),
            log: vec![format!("Disconnected: {reason}")],
            playback: None,
        },
        RoomEvent::ConnectionStateChanged(state) => {
            let mut log = vec![format!("Connection state: {state}")];
            if *state == ConnectionState::Reconnecting {
                log.push("Attempting to reconnect...".to_string());
            }
            Transition {
                log,
                ..Transition::default()
            }
        }
        RoomEvent::ParticipantConnected(participant) => Transition {
            log: vec![format!("Participant joined: {}", participant.identity)],
            ..Transition::default()
        },
        RoomEvent::TrackSubscribed {
            track, participant, ..
        } => match track.kind {
            TrackKind::Audio => Transition {
                log: vec![format!("Audio track received from {}", participant.identity)],
                playback: Some((track.clone(), participant.clone())),
                ..Transition::default()
            },
            TrackKind::Video => Transition::default(),
        },
    }
}
