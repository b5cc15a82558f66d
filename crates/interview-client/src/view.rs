//! Presentation of session state.
//!
//! [`SessionView::render`] is a pure function of a [`SessionSnapshot`]. The
//! `Display` impl renders the view as plain text for terminal front-ends.

use crate::controller::state::{SessionSnapshot, SessionStatus};

use std::fmt;

/// Connection indicator shown at the top of the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIndicator {
    Connected,
    Connecting,
    Disconnected,
}

impl StatusIndicator {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            StatusIndicator::Connected => "Connected",
            StatusIndicator::Connecting => "Connecting...",
            StatusIndicator::Disconnected => "Disconnected",
        }
    }
}

/// An action the candidate can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartInterview,
    EnableMicrophone,
    EndInterview,
}

impl Action {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Action::StartInterview => "Start Interview",
            Action::EnableMicrophone => "Enable Microphone",
            Action::EndInterview => "End Interview",
        }
    }
}

const INSTRUCTION_START: &str =
    "Click \"Start Interview\" to begin your AI-powered interview session.";
const INSTRUCTION_ENABLE_MICROPHONE: &str =
    "Enable your microphone to start speaking with the AI interviewer.";
const INSTRUCTION_LIVE: &str =
    "You're live! The AI interviewer will ask you questions. Speak naturally.";

/// Everything a front-end needs to draw the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub status: StatusIndicator,
    pub room: Option<String>,
    pub error: Option<String>,
    pub actions: Vec<Action>,
    pub instruction: &'static str,
    /// Show the audio activity indicator.
    pub audio_active: bool,
    pub log: Vec<String>,
}

impl SessionView {
    #[must_use]
    pub fn render(snapshot: &SessionSnapshot) -> Self {
        let session = &snapshot.session;
        let connected = session.status == SessionStatus::Connected;
        let connecting = session.status.is_connecting();
        let microphone = connected && session.microphone_enabled;

        let status = if connected {
            StatusIndicator::Connected
        } else if connecting {
            StatusIndicator::Connecting
        } else {
            StatusIndicator::Disconnected
        };

        let mut actions = Vec::new();
        if !connected && !connecting {
            actions.push(Action::StartInterview);
        }
        if connected && !microphone {
            actions.push(Action::EnableMicrophone);
        }
        if connected {
            actions.push(Action::EndInterview);
        }

        let instruction = match (connected, microphone) {
            (false, _) => INSTRUCTION_START,
            (true, false) => INSTRUCTION_ENABLE_MICROPHONE,
            (true, true) => INSTRUCTION_LIVE,
        };

        Self {
            status,
            room: session.room_name.as_ref().map(ToString::to_string),
            error: session.last_error.clone(),
            actions,
            instruction,
            audio_active: microphone,
            log: snapshot.log.iter().map(ToString::to_string).collect(),
        }
    }
}

impl fmt::Display for SessionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "AI Interview Assistant")?;
        if self.audio_active {
            writeln!(f, "[audio active]")?;
        }
        writeln!(f, "Status: {}", self.status.label())?;
        if let Some(room) = &self.room {
            writeln!(f, "Room: {room}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "Error: {error}")?;
        }
        if !self.actions.is_empty() {
            let labels: Vec<_> = self.actions.iter().map(|a| a.label()).collect();
            writeln!(f, "Actions: {}", labels.join(" | "))?;
        }
        writeln!(f, "{}", self.instruction)?;
        writeln!(f)?;
        writeln!(f, "Interview Log")?;
        for line in &self.log {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::controller::state::{Session, SessionStore};
    use common::types::RoomName;

    fn snapshot_with(session: Session) -> SessionSnapshot {
        let store = SessionStore::new();
        store.transact(None, |s, _| *s = session);
        store.snapshot()
    }

    #[test]
    fn test_idle_view() {
        let view = SessionView::render(&SessionSnapshot::default());

        assert_eq!(view.status, StatusIndicator::Disconnected);
        assert_eq!(view.actions, vec![Action::StartInterview]);
        assert_eq!(view.instruction, INSTRUCTION_START);
        assert!(!view.audio_active);
        assert_eq!(view.room, None);
    }

    #[test]
    fn test_creating_and_connecting_hide_start() {
        for status in [SessionStatus::Creating, SessionStatus::Connecting] {
            let view = SessionView::render(&snapshot_with(Session {
                status,
                ..Session::idle()
            }));
            assert_eq!(view.status.label(), "Connecting...");
            assert!(view.actions.is_empty());
        }
    }

    #[test]
    fn test_connected_without_microphone() {
        let view = SessionView::render(&snapshot_with(Session {
            status: SessionStatus::Connected,
            room_name: Some(RoomName::from("interview-q1w2e3r4t5y6")),
            ..Session::idle()
        }));

        assert_eq!(view.status, StatusIndicator::Connected);
        assert_eq!(
            view.actions,
            vec![Action::EnableMicrophone, Action::EndInterview]
        );
        assert_eq!(view.instruction, INSTRUCTION_ENABLE_MICROPHONE);
        assert_eq!(view.room.as_deref(), Some("interview-q1w2e3r4t5y6"));
    }

    #[test]
    fn test_connected_with_microphone_is_live() {
        let view = SessionView::render(&snapshot_with(Session {
            status: SessionStatus::Connected,
            microphone_enabled: true,
            ..Session::idle()
        }));

        assert_eq!(view.actions, vec![Action::EndInterview]);
        assert_eq!(view.instruction, INSTRUCTION_LIVE);
        assert!(view.audio_active);
    }

    #[test]
    fn test_text_rendering_includes_error_and_log() {
        let store = SessionStore::new();
        store.transact(None, |s, log| {
            s.status = SessionStatus::Disconnected;
            s.last_error = Some("Connection lost: ROOM_DELETED".to_string());
            log.push("Disconnected: ROOM_DELETED".to_string());
        });

        let text = SessionView::render(&store.snapshot()).to_string();

        assert!(text.contains("Status: Disconnected"));
        assert!(text.contains("Error: Connection lost: ROOM_DELETED"));
        assert!(text.contains("Actions: Start Interview"));
        assert!(text.contains("] Disconnected: ROOM_DELETED"));
    }
}
