//! Session lifecycle controller.
//!
//! `SessionController` is the only consumer of the media room and the only
//! producer of candidate-visible state. It exposes three actions:
//!
//! - [`SessionController::start_session`] requests a room and credential,
//!   creates the room and connects it
//! - [`SessionController::enable_microphone`] publishes local audio
//! - [`SessionController::end_session`] disconnects and resets
//!
//! ```text
//! Idle ──start──> Creating ──room+token──> Connecting ──Connected──> Connected
//!                    │                        │                         │
//!                    └──fetch failure──┐      └──failure/timeout/──┐    │
//!                                      v         Disconnected      v    │
//!                                 Disconnected <─────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`state`] - Observable session store
//! - [`transitions`] - Room event translation table

mod pump;
pub mod state;
pub mod transitions;

use crate::config::Config;
use crate::errors::SessionError;
use crate::gateway::{BackendGateway, Credential, GatewayError};
use crate::observability::metrics;
use crate::room::{AudioPlayback, RoomConnector, RoomHandle, RoomOptions};

use state::{SessionSnapshot, SessionStatus, SessionStore, SessionWatcher};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Tunables for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Options for every room the controller creates.
    pub room_options: RoomOptions,
    /// Bound on each gateway call.
    pub request_timeout: Duration,
    /// Bound on the room `connect` call.
    pub connect_timeout: Duration,
    /// Publish the microphone as soon as the session is connected.
    pub microphone_on_connect: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            room_options: RoomOptions::default(),
            request_timeout: config.request_timeout,
            connect_timeout: config.connect_timeout,
            microphone_on_connect: config.microphone_on_connect,
        }
    }
}

/// Result of a `start_session` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// `connect` returned and the room belongs to this session.
    Started,
    /// A session was already starting or connected; nothing was done.
    AlreadyActive(SessionStatus),
    /// `end_session` or `teardown` ran while this start was in flight.
    Superseded,
}

impl StartOutcome {
    fn metric_label(self) -> &'static str {
        match self {
            StartOutcome::Started => "started",
            StartOutcome::AlreadyActive(_) => "already_active",
            StartOutcome::Superseded => "superseded",
        }
    }
}

struct Inner {
    gateway: Arc<dyn BackendGateway>,
    connector: Arc<dyn RoomConnector>,
    playback: Arc<dyn AudioPlayback>,
    settings: SessionSettings,
    store: SessionStore,
    /// The single live room, if any.
    room: Mutex<Option<RoomHandle>>,
    microphone_preference: AtomicBool,
}

/// Owner of the interview session lifecycle.
///
/// Cloning is cheap; all clones drive the same session. Dropping the last
/// clone releases any live room.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("settings", &self.inner.settings)
            .field("session", &self.inner.store.session())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create a controller in the `Idle` state.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        connector: Arc<dyn RoomConnector>,
        playback: Arc<dyn AudioPlayback>,
        settings: SessionSettings,
    ) -> Self {
        let microphone_preference = AtomicBool::new(settings.microphone_on_connect);
        Self {
            inner: Arc::new(Inner {
                gateway,
                connector,
                playback,
                settings,
                store: SessionStore::new(),
                room: Mutex::new(None),
                microphone_preference,
            }),
        }
    }

    /// Subscribe to session state changes.
    #[must_use]
    pub fn subscribe(&self) -> SessionWatcher {
        self.inner.store.subscribe()
    }

    /// Current session state and log.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.store.snapshot()
    }

    /// Tunables this controller was built with.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Start a new session.
    ///
    /// A no-op returning `AlreadyActive` unless the status is `Idle` or
    /// `Disconnected`. Every failure is also reflected in the session state
    /// and log.
    ///
    /// # Errors
    ///
    /// - `SessionError::RoomCreation` / `CredentialIssue` if the gateway fails
    /// - `SessionError::Connect` / `ConnectTimeout` if the room cannot connect
    #[instrument(skip_all)]
    pub async fn start_session(&self) -> Result<StartOutcome, SessionError> {
        let Some(generation) = self.inner.store.begin_attempt() else {
            let status = self.inner.store.session().status;
            debug!(target: "interview.controller", %status, "Session already active, ignoring start");
            let outcome = StartOutcome::AlreadyActive(status);
            metrics::record_session_start(outcome.metric_label());
            return Ok(outcome);
        };

        info!(target: "interview.controller", generation, "Starting session");
        let started = Instant::now();

        // A room left behind by a lost connection is released before a new
        // one is created.
        let previous = self.inner.room.lock().await.take();
        if let Some(previous) = previous {
            release_quietly(previous).await;
        }

        let result = self.run_attempt(generation).await;

        match &result {
            Ok(outcome) => {
                metrics::record_session_start(outcome.metric_label());
                if *outcome == StartOutcome::Started {
                    metrics::record_setup_duration("success", started.elapsed());
                }
            }
            Err(e) => {
                metrics::record_session_start(e.metric_label());
                metrics::record_setup_duration("error", started.elapsed());
            }
        }

        result
    }

    async fn run_attempt(&self, generation: u64) -> Result<StartOutcome, SessionError> {
        let inner = &self.inner;
        let request_timeout = inner.settings.request_timeout;

        inner.store.log(Some(generation), "Creating interview room...");

        let room_name =
            match tokio::time::timeout(request_timeout, inner.gateway.create_room()).await {
                Ok(Ok(room_name)) => room_name,
                Ok(Err(e)) => return self.fail_setup(generation, SessionError::RoomCreation(e)),
                Err(_) => {
                    return self.fail_setup(
                        generation,
                        SessionError::RoomCreation(GatewayError::Timeout(request_timeout)),
                    )
                }
            };

        let recorded = inner.store.transact(Some(generation), |session, log| {
            session.room_name = Some(room_name.clone());
            log.push(format!("Room created: {room_name}"));
        });
        if !recorded {
            return Ok(StartOutcome::Superseded);
        }

        let credential = match tokio::time::timeout(
            request_timeout,
            inner.gateway.issue_credential(&room_name),
        )
        .await
        {
            Ok(Ok(credential)) => credential,
            Ok(Err(e)) => return self.fail_setup(generation, SessionError::CredentialIssue(e)),
            Err(_) => {
                return self.fail_setup(
                    generation,
                    SessionError::CredentialIssue(GatewayError::Timeout(request_timeout)),
                )
            }
        };

        if !inner.store.log(Some(generation), credential_message(&credential)) {
            return Ok(StartOutcome::Superseded);
        }

        // The pump is subscribed before connect is called.
        let (room, events) = inner.connector.create_room(&inner.settings.room_options);
        let pump_cancel = CancellationToken::new();
        tokio::spawn(pump::run(
            events,
            inner.store.clone(),
            Arc::clone(&inner.playback),
            generation,
            pump_cancel.clone(),
        ));
        let handle = RoomHandle::new(Arc::clone(&room), generation, pump_cancel);

        let displaced = {
            let mut slot = inner.room.lock().await;
            if inner.store.generation() != generation {
                drop(slot);
                release_quietly(handle).await;
                return Ok(StartOutcome::Superseded);
            }
            slot.replace(handle)
        };
        if let Some(displaced) = displaced {
            warn!(
                target: "interview.controller",
                generation = displaced.generation(),
                "Releasing displaced room"
            );
            release_quietly(displaced).await;
        }

        let connecting = inner.store.transact(Some(generation), |session, log| {
            session.status = SessionStatus::Connecting;
            log.push("Connecting to media server...".to_string());
        });
        if !connecting {
            return Ok(StartOutcome::Superseded);
        }

        let connect_timeout = inner.settings.connect_timeout;
        let connected = tokio::time::timeout(
            connect_timeout,
            room.connect(&credential.room_url, &credential.access_token),
        )
        .await;
        drop(credential);

        match connected {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return self.fail_connect(generation, SessionError::Connect(e)).await,
            Err(_) => {
                return self
                    .fail_connect(generation, SessionError::ConnectTimeout(connect_timeout))
                    .await
            }
        }

        if inner.microphone_preference.load(Ordering::SeqCst) {
            self.enable_microphone_when_connected(generation).await;
        }

        if inner.store.generation() != generation {
            return Ok(StartOutcome::Superseded);
        }
        info!(target: "interview.controller", generation, "Session started");
        Ok(StartOutcome::Started)
    }

    fn fail_setup(
        &self,
        generation: u64,
        error: SessionError,
    ) -> Result<StartOutcome, SessionError> {
        if self.inner.store.fail_attempt(generation, &error) {
            warn!(target: "interview.controller", generation, error = %error, "Session setup failed");
            Err(error)
        } else {
            Ok(StartOutcome::Superseded)
        }
    }

    async fn fail_connect(
        &self,
        generation: u64,
        error: SessionError,
    ) -> Result<StartOutcome, SessionError> {
        if !self.inner.store.fail_attempt(generation, &error) {
            return Ok(StartOutcome::Superseded);
        }
        warn!(target: "interview.controller", generation, error = %error, "Room connect failed");

        let handle = {
            let mut slot = self.inner.room.lock().await;
            if slot.as_ref().is_some_and(|h| h.generation() == generation) {
                slot.take()
            } else {
                None
            }
        };
        if let Some(handle) = handle {
            release_quietly(handle).await;
        }
        Err(error)
    }

    async fn enable_microphone_when_connected(&self, generation: u64) {
        let mut watcher = self.inner.store.subscribe();
        let waited = tokio::time::timeout(
            self.inner.settings.connect_timeout,
            watcher.wait_for_status(|status| !status.is_connecting()),
        )
        .await;

        match waited {
            Ok(Ok(SessionStatus::Connected)) if self.inner.store.generation() == generation => {
                if let Err(e) = self.enable_microphone().await {
                    debug!(target: "interview.controller", error = %e, "Microphone not enabled on connect");
                }
            }
            _ => {
                debug!(target: "interview.controller", generation, "Session not connected, microphone left off");
            }
        }
    }

    /// Publish the candidate's microphone (video stays off).
    ///
    /// A failure leaves the session connected with the microphone off and
    /// `last_error` set.
    ///
    /// # Errors
    ///
    /// - `SessionError::NoActiveRoom` / `NotConnected` if the precondition
    ///   does not hold (no state change)
    /// - `SessionError::Microphone` if publishing failed
    #[instrument(skip_all)]
    pub async fn enable_microphone(&self) -> Result<(), SessionError> {
        let inner = &self.inner;

        let (room, generation) = {
            let slot = inner.room.lock().await;
            match slot.as_ref() {
                Some(handle) => (handle.room(), handle.generation()),
                None => {
                    metrics::record_microphone_request("rejected");
                    return Err(SessionError::NoActiveRoom);
                }
            }
        };

        let session = inner.store.session();
        if session.status != SessionStatus::Connected {
            metrics::record_microphone_request("rejected");
            return Err(SessionError::NotConnected(session.status));
        }
        if session.microphone_enabled {
            return Ok(());
        }

        inner.store.log(Some(generation), "Enabling microphone...");

        match room.enable_camera_and_microphone(false, true).await {
            Ok(()) => {
                let mut status = SessionStatus::Disconnected;
                let mut enabled = false;
                inner.store.transact(Some(generation), |session, log| {
                    status = session.status;
                    if session.status == SessionStatus::Connected {
                        session.microphone_enabled = true;
                        enabled = true;
                        log.push("Microphone enabled".to_string());
                    }
                });
                if !enabled {
                    metrics::record_microphone_request("rejected");
                    return Err(SessionError::NotConnected(status));
                }
                inner.microphone_preference.store(true, Ordering::SeqCst);
                metrics::record_microphone_request("success");
                Ok(())
            }
            Err(e) => {
                let log_line = format!("Microphone error: {}", e.detail());
                let error = SessionError::Microphone(e);
                let last_error = error.user_message();
                inner.store.transact(Some(generation), |session, log| {
                    session.last_error = Some(last_error);
                    log.push(log_line);
                });
                warn!(target: "interview.controller", error = %error, "Microphone enable failed");
                metrics::record_microphone_request("error");
                Err(error)
            }
        }
    }

    /// End the session: release the room, reset the session.
    ///
    /// Idempotent. The room is released even if its disconnect fails, and a
    /// start still in flight is superseded.
    #[instrument(skip_all)]
    pub async fn end_session(&self) {
        let inner = &self.inner;
        let was_active = !inner.store.session().status.can_start();
        let retired = inner.store.supersede();

        let handle = self.take_room_before(retired).await;
        let had_room = handle.is_some();
        if let Some(handle) = handle {
            inner.store.log(None, "Disconnecting from room...");
            release_quietly(handle).await;
        }

        if inner.store.reset(Some(retired)) {
            inner.microphone_preference.store(
                inner.settings.microphone_on_connect,
                Ordering::SeqCst,
            );
            if was_active || had_room {
                inner.store.log(Some(retired), "Session ended");
                info!(target: "interview.controller", "Session ended");
            }
        }
    }

    /// Release the room without touching candidate-visible state.
    #[instrument(skip_all)]
    pub async fn teardown(&self) {
        let retired = self.inner.store.supersede();
        if let Some(handle) = self.take_room_before(retired).await {
            release_quietly(handle).await;
        }
        debug!(target: "interview.controller", "Controller torn down");
    }

    /// Take the live room if it belongs to an attempt older than `retired`.
    async fn take_room_before(&self, retired: u64) -> Option<RoomHandle> {
        let mut slot = self.inner.room.lock().await;
        if slot.as_ref().is_some_and(|h| h.generation() < retired) {
            slot.take()
        } else {
            None
        }
    }

    /// Whether a room is currently owned.
    pub async fn has_room(&self) -> bool {
        self.inner.room.lock().await.is_some()
    }
}

fn credential_message(credential: &Credential) -> String {
    match credential.expires_in {
        Some(expires_in) => format!(
            "Fresh token generated (expires in {} seconds)",
            expires_in.as_secs()
        ),
        None => "Fresh token generated".to_string(),
    }
}

async fn release_quietly(handle: RoomHandle) {
    let generation = handle.generation();
    if let Err(e) = handle.release().await {
        warn!(
            target: "interview.controller",
            generation,
            error = %e,
            "Room disconnect failed, ownership released anyway"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::room::mock::{MockAudioPlayback, MockRoomConnector};

    fn controller(
        gateway: MockGateway,
        connector: Arc<MockRoomConnector>,
    ) -> SessionController {
        SessionController::new(
            Arc::new(gateway),
            connector,
            Arc::new(MockAudioPlayback::new()),
            SessionSettings::default(),
        )
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config {
            request_timeout: Duration::from_secs(4),
            connect_timeout: Duration::from_secs(12),
            microphone_on_connect: true,
            ..Config::default()
        };
        let settings = SessionSettings::from(&config);
        assert_eq!(settings.request_timeout, Duration::from_secs(4));
        assert_eq!(settings.connect_timeout, Duration::from_secs(12));
        assert!(settings.microphone_on_connect);
        assert_eq!(settings.room_options, RoomOptions::default());

        let controller = SessionController::new(
            Arc::new(MockGateway::new()),
            Arc::new(MockRoomConnector::new()),
            Arc::new(MockAudioPlayback::new()),
            settings.clone(),
        );
        assert_eq!(controller.settings(), &settings);
    }

    #[test]
    fn test_credential_message() {
        let credential = Credential {
            room_url: "wss://m".to_string(),
            access_token: "t".into(),
            expires_in: Some(Duration::from_secs(21600)),
        };
        assert_eq!(
            credential_message(&credential),
            "Fresh token generated (expires in 21600 seconds)"
        );
    }

    #[tokio::test]
    async fn test_start_passes_credential_to_connect() {
        let connector = Arc::new(MockRoomConnector::new());
        let controller = controller(MockGateway::new(), Arc::clone(&connector));

        let outcome = controller.start_session().await.unwrap();

        assert_eq!(outcome, StartOutcome::Started);
        let room = connector.last_room().unwrap();
        assert_eq!(
            room.connected_with(),
            Some((
                "wss://media.mock.local".to_string(),
                "mock-token-1".to_string()
            ))
        );
        assert_eq!(connector.last_options(), Some(RoomOptions::default()));
        assert!(controller.has_room().await);
    }

    #[tokio::test]
    async fn test_enable_microphone_without_room() {
        let connector = Arc::new(MockRoomConnector::new());
        let controller = controller(MockGateway::new(), connector);

        let result = controller.enable_microphone().await;
        assert_eq!(result, Err(SessionError::NoActiveRoom));
        assert_eq!(controller.snapshot().session.status, SessionStatus::Idle);
        assert!(controller.snapshot().log.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_keeps_visible_state() {
        let connector = Arc::new(MockRoomConnector::new());
        let controller = controller(MockGateway::new(), Arc::clone(&connector));
        controller.start_session().await.unwrap();
        let before = controller.snapshot().session;

        controller.teardown().await;

        assert_eq!(connector.last_room().unwrap().disconnect_calls(), 1);
        assert!(!controller.has_room().await);
        assert_eq!(controller.snapshot().session.room_name, before.room_name);
    }
}
