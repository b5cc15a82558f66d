//! Observable session state.
//!
//! [`SessionStore`] is the single writer of the session aggregate and the
//! candidate-facing log. Readers hold a [`SessionWatcher`], a thin wrapper
//! around a `tokio::sync::watch` receiver.
//!
//! Every write that belongs to a connection attempt is tagged with the
//! attempt generation. A write whose generation is no longer current is
//! dropped, which is how events from a released room and results of a
//! superseded start are discarded.

use crate::errors::SessionError;

use chrono::{DateTime, Local, Utc};
use common::types::RoomName;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

/// Lifecycle status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Nothing has been started yet.
    Idle,
    /// Requesting a room name and credential.
    Creating,
    /// Room constructed, `connect` in flight.
    Connecting,
    Connected,
    Disconnected,
}

impl SessionStatus {
    /// Whether `start_session` may begin a new attempt from this status.
    #[must_use]
    pub fn can_start(self) -> bool {
        matches!(self, SessionStatus::Idle | SessionStatus::Disconnected)
    }

    /// Whether a start is in flight.
    #[must_use]
    pub fn is_connecting(self) -> bool {
        matches!(self, SessionStatus::Creating | SessionStatus::Connecting)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Creating => "creating",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The session aggregate shown to the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub room_name: Option<RoomName>,
    pub status: SessionStatus,
    pub microphone_enabled: bool,
    pub last_error: Option<String>,
}

impl Session {
    /// The initial session.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            room_name: None,
            status: SessionStatus::Idle,
            microphone_enabled: false,
            last_error: None,
        }
    }

    /// The session after `end_session`.
    #[must_use]
    pub fn reset() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            ..Self::idle()
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::idle()
    }
}

/// One line of the candidate-facing log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.with_timezone(&Local).format("%H:%M:%S"),
            self.message
        )
    }
}

/// Point-in-time copy of the session and its log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Session,
    pub log: Vec<LogEntry>,
    generation: u64,
}

impl SessionSnapshot {
    /// Attempt generation this snapshot was taken at.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The store was dropped while waiting for a change.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Session store closed")]
pub struct StoreClosed;

/// Single writer of the observable session state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sender: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store holding an idle session and an empty log.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(SessionSnapshot::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> SessionWatcher {
        SessionWatcher(self.sender.subscribe())
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.sender.borrow().clone()
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.sender.borrow().session.clone()
    }

    /// Current attempt generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.sender.borrow().generation
    }

    /// Begin a new connection attempt if the session can start.
    ///
    /// The status check and the move to `Creating` happen in one update, so
    /// two concurrent callers cannot both begin. Returns the new generation,
    /// or `None` when an attempt is already active.
    pub fn begin_attempt(&self) -> Option<u64> {
        let mut begun = None;
        self.sender.send_if_modified(|snapshot| {
            if !snapshot.session.status.can_start() {
                return false;
            }
            snapshot.generation += 1;
            snapshot.session = Session {
                status: SessionStatus::Creating,
                ..Session::idle()
            };
            begun = Some(snapshot.generation);
            true
        });
        begun
    }

    /// Apply an update to the session and append log lines.
    ///
    /// With `Some(generation)` the update is dropped unless that generation
    /// is still current. Returns whether the update was applied.
    pub fn transact<F>(&self, generation: Option<u64>, update: F) -> bool
    where
        F: FnOnce(&mut Session, &mut Vec<String>),
    {
        let mut applied = false;
        self.sender.send_if_modified(|snapshot| {
            if generation.is_some_and(|g| g != snapshot.generation) {
                return false;
            }
            applied = true;

            let before = snapshot.session.clone();
            let mut messages = Vec::new();
            update(&mut snapshot.session, &mut messages);
            if snapshot.session.status != SessionStatus::Connected {
                snapshot.session.microphone_enabled = false;
            }

            let logged = !messages.is_empty();
            for message in messages {
                push_log(&mut snapshot.log, message);
            }
            logged || snapshot.session != before
        });
        applied
    }

    /// Append one log line, subject to the same generation check as `transact`.
    pub fn log(&self, generation: Option<u64>, message: impl Into<String>) -> bool {
        let message = message.into();
        self.transact(generation, move |_, log| log.push(message))
    }

    /// Record a failed attempt and retire its generation.
    ///
    /// Sets `Disconnected`, stores the error text and logs it once. Events
    /// still queued for the failed room are discarded afterwards.
    pub fn fail_attempt(&self, generation: u64, error: &SessionError) -> bool {
        let text = error.user_message();
        let mut applied = false;
        self.sender.send_if_modified(|snapshot| {
            if snapshot.generation != generation {
                return false;
            }
            applied = true;
            snapshot.generation += 1;
            snapshot.session.status = SessionStatus::Disconnected;
            snapshot.session.microphone_enabled = false;
            snapshot.session.last_error = Some(text.clone());
            push_log(&mut snapshot.log, text);
            true
        });
        applied
    }

    /// Retire the current generation without touching visible state.
    pub fn supersede(&self) -> u64 {
        let mut current = 0;
        self.sender.send_if_modified(|snapshot| {
            snapshot.generation += 1;
            current = snapshot.generation;
            false
        });
        current
    }

    /// Reset the session to the ended shape. The log is kept.
    ///
    /// With `Some(generation)` the reset is skipped if a newer attempt has
    /// begun since.
    pub fn reset(&self, generation: Option<u64>) -> bool {
        let mut applied = false;
        self.sender.send_if_modified(|snapshot| {
            if generation.is_some_and(|g| g != snapshot.generation) {
                return false;
            }
            applied = true;
            if snapshot.session == Session::reset() {
                return false;
            }
            snapshot.session = Session::reset();
            true
        });
        applied
    }
}

/// Append a log entry with a timestamp no earlier than the previous one.
fn push_log(log: &mut Vec<LogEntry>, message: String) {
    let now = Utc::now();
    let timestamp = match log.last() {
        Some(last) if last.timestamp > now => last.timestamp,
        _ => now,
    };
    info!(target: "interview.session", "{message}");
    log.push(LogEntry { timestamp, message });
}

/// Read side of the session store.
///
/// Snapshots are cloned out so the store is never blocked by a reader.
#[derive(Debug, Clone)]
pub struct SessionWatcher(watch::Receiver<SessionSnapshot>);

impl SessionWatcher {
    /// Current snapshot; marks it as seen.
    #[must_use]
    pub fn snapshot(&mut self) -> SessionSnapshot {
        self.0.borrow_and_update().clone()
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.0.borrow().session.clone()
    }

    /// Wait until the state changes after the last seen snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreClosed` if the store was dropped.
    pub async fn changed(&mut self) -> Result<(), StoreClosed> {
        self.0.changed().await.map_err(|_| StoreClosed)
    }

    /// Wait until the status satisfies `predicate` (checked immediately).
    ///
    /// # Errors
    ///
    /// Returns `StoreClosed` if the store was dropped first.
    pub async fn wait_for_status<P>(&mut self, mut predicate: P) -> Result<SessionStatus, StoreClosed>
    where
        P: FnMut(SessionStatus) -> bool,
    {
        self.0
            .wait_for(|snapshot| predicate(snapshot.session.status))
            .await
            .map(|snapshot| snapshot.session.status)
            .map_err(|_| StoreClosed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use chrono::TimeZone;

    #[test]
    fn test_begin_attempt_only_from_idle_or_disconnected() {
        let store = SessionStore::new();

        let first = store.begin_attempt();
        assert_eq!(first, Some(1));
        assert_eq!(store.session().status, SessionStatus::Creating);

        // Creating blocks another start
        assert_eq!(store.begin_attempt(), None);
        assert_eq!(store.generation(), 1);

        store.transact(first, |s, _| s.status = SessionStatus::Connected);
        assert_eq!(store.begin_attempt(), None);

        store.transact(first, |s, _| s.status = SessionStatus::Disconnected);
        assert_eq!(store.begin_attempt(), Some(2));
    }

    #[test]
    fn test_begin_attempt_clears_previous_error_and_room() {
        let store = SessionStore::new();
        let generation = store.begin_attempt().unwrap();
        store.transact(Some(generation), |s, _| {
            s.room_name = Some(RoomName::from("interview-a"));
        });
        store.fail_attempt(
            generation,
            &SessionError::RoomCreation(GatewayError::Http("refused".into())),
        );
        assert!(store.session().last_error.is_some());

        store.begin_attempt().unwrap();
        let session = store.session();
        assert_eq!(session.status, SessionStatus::Creating);
        assert_eq!(session.last_error, None);
        assert_eq!(session.room_name, None);
    }

    #[test]
    fn test_stale_generation_is_dropped() {
        let store = SessionStore::new();
        let generation = store.begin_attempt().unwrap();
        store.supersede();

        let applied = store.transact(Some(generation), |s, log| {
            s.status = SessionStatus::Connected;
            log.push("late".to_string());
        });

        assert!(!applied);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.session.status, SessionStatus::Creating);
        assert!(snapshot.log.is_empty());
    }

    #[test]
    fn test_microphone_requires_connected() {
        let store = SessionStore::new();
        let generation = store.begin_attempt();
        store.transact(generation, |s, _| {
            s.status = SessionStatus::Connected;
            s.microphone_enabled = true;
        });
        assert!(store.session().microphone_enabled);

        store.transact(generation, |s, _| s.status = SessionStatus::Disconnected);
        assert!(!store.session().microphone_enabled);

        // Setting the flag while not connected has no effect
        store.transact(None, |s, _| s.microphone_enabled = true);
        assert!(!store.session().microphone_enabled);
    }

    #[test]
    fn test_fail_attempt_logs_once_and_retires_generation() {
        let store = SessionStore::new();
        let generation = store.begin_attempt().unwrap();
        let error = SessionError::RoomCreation(GatewayError::Status {
            endpoint: "create-room",
            status: 500,
        });

        assert!(store.fail_attempt(generation, &error));
        assert!(!store.fail_attempt(generation, &error));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.session.status, SessionStatus::Disconnected);
        assert_eq!(
            snapshot.session.last_error.as_deref(),
            Some("Room creation failed: backend returned HTTP 500")
        );
        assert_eq!(snapshot.log.len(), 1);
        assert!(!store.log(Some(generation), "stale"));
    }

    #[test]
    fn test_reset_keeps_log() {
        let store = SessionStore::new();
        let generation = store.begin_attempt();
        store.transact(generation, |s, log| {
            s.status = SessionStatus::Connected;
            s.room_name = Some(RoomName::from("interview-b"));
            s.last_error = Some("Microphone access denied".to_string());
            log.push("Connected to interview room".to_string());
        });

        let retired = store.supersede();
        assert!(store.reset(Some(retired)));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.session, Session::reset());
        assert_eq!(snapshot.log.len(), 1);
    }

    #[test]
    fn test_log_timestamps_never_decrease() {
        let mut log = vec![LogEntry {
            timestamp: Utc::now() + chrono::Duration::hours(1),
            message: "from the future".to_string(),
        }];
        push_log(&mut log, "now".to_string());

        let first = log.first().unwrap();
        let last = log.last().unwrap();
        assert_eq!(log.len(), 2);
        assert!(last.timestamp >= first.timestamp);
    }

    #[test]
    fn test_log_entry_display() {
        let timestamp = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 5).unwrap();
        let entry = LogEntry {
            timestamp,
            message: "Room created: interview-x".to_string(),
        };
        let expected = format!(
            "[{}] Room created: interview-x",
            timestamp.with_timezone(&Local).format("%H:%M:%S")
        );
        assert_eq!(entry.to_string(), expected);
        assert!(entry.to_string().ends_with("] Room created: interview-x"));
    }

    #[tokio::test]
    async fn test_watcher_sees_changes() {
        let store = SessionStore::new();
        let mut watcher = store.subscribe();
        assert_eq!(watcher.snapshot().session, Session::idle());

        let writer = store.clone();
        tokio::spawn(async move {
            let generation = writer.begin_attempt();
            writer.transact(generation, |s, _| s.status = SessionStatus::Connected);
        });

        let status = watcher
            .wait_for_status(|s| s == SessionStatus::Connected)
            .await
            .unwrap();
        assert_eq!(status, SessionStatus::Connected);
    }

    #[tokio::test]
    async fn test_supersede_does_not_notify() {
        let store = SessionStore::new();
        let mut watcher = store.subscribe();
        let _ = watcher.snapshot();

        store.supersede();

        let changed =
            tokio::time::timeout(std::time::Duration::from_millis(20), watcher.changed()).await;
        assert!(changed.is_err());
    }
}
