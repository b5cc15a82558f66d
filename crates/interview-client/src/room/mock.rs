//! Mock media room implementations for testing.
//!
//! `MockRoomConnector` hands out `MockRoom`s and keeps a reference to each
//! so tests can inspect calls and inject events:
//!
//! ```rust,ignore
//! let connector = Arc::new(MockRoomConnector::new());
//! // ... run the controller ...
//! let room = connector.last_room().unwrap();
//! room.emit(RoomEvent::Disconnected { reason: DisconnectReason::RoomDeleted });
//! ```

use super::{
    AudioPlayback, DisconnectReason, MediaRoom, RemoteParticipant, RemoteTrack, RoomConnector,
    RoomError, RoomEvent, RoomEventReceiver, RoomEventSender, RoomOptions,
};

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// How a mock room answers `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Succeed and emit `RoomEvent::Connected`.
    Succeed,
    /// Succeed without emitting any event.
    SucceedSilently,
    /// Fail with the given error.
    Fail(RoomError),
    /// Never resolve.
    Hang,
}

#[derive(Debug, Clone)]
struct MockRoomSettings {
    connect: ConnectBehavior,
    microphone_error: Option<RoomError>,
    disconnect_error: Option<RoomError>,
}

/// Mock connector that records every room it creates.
#[derive(Debug)]
pub struct MockRoomConnector {
    settings: MockRoomSettings,
    rooms: Mutex<Vec<Arc<MockRoom>>>,
    options: Mutex<Vec<RoomOptions>>,
}

impl Default for MockRoomConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRoomConnector {
    /// Create a connector whose rooms connect and publish successfully.
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: MockRoomSettings {
                connect: ConnectBehavior::Succeed,
                microphone_error: None,
                disconnect_error: None,
            },
            rooms: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    /// Configure how rooms answer `connect`.
    #[must_use]
    pub fn with_connect(mut self, behavior: ConnectBehavior) -> Self {
        self.settings.connect = behavior;
        self
    }

    /// Rooms reject microphone publication with `PermissionDenied`.
    #[must_use]
    pub fn denying_microphone(mut self, reason: &str) -> Self {
        self.settings.microphone_error = Some(RoomError::PermissionDenied(reason.to_string()));
        self
    }

    /// Rooms return the given error from `disconnect`.
    #[must_use]
    pub fn failing_disconnect(mut self, error: RoomError) -> Self {
        self.settings.disconnect_error = Some(error);
        self
    }

    /// Number of rooms created so far.
    pub fn rooms_created(&self) -> usize {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// All rooms created so far, oldest first.
    pub fn rooms(&self) -> Vec<Arc<MockRoom>> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recently created room.
    pub fn last_room(&self) -> Option<Arc<MockRoom>> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Options passed to the most recent `create_room`.
    pub fn last_options(&self) -> Option<RoomOptions> {
        self.options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl RoomConnector for MockRoomConnector {
    fn create_room(&self, options: &RoomOptions) -> (Arc<dyn MediaRoom>, RoomEventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let room = Arc::new(MockRoom::new(sender, self.settings.clone()));

        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&room));
        self.options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(options.clone());

        (room, receiver)
    }
}

/// A mock room that records calls and lets tests inject events.
#[derive(Debug)]
pub struct MockRoom {
    events: RoomEventSender,
    settings: MockRoomSettings,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    publish_calls: Mutex<Vec<(bool, bool)>>,
    connected_with: Mutex<Option<(String, String)>>,
}

impl MockRoom {
    fn new(events: RoomEventSender, settings: MockRoomSettings) -> Self {
        Self {
            events,
            settings,
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            publish_calls: Mutex::new(Vec::new()),
            connected_with: Mutex::new(None),
        }
    }

    /// Inject an event as if the media library emitted it.
    ///
    /// Returns false once the event receiver is gone.
    pub fn emit(&self, event: RoomEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Number of `connect` calls.
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` calls.
    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// `(video, audio)` arguments of every publish call.
    pub fn publish_calls(&self) -> Vec<(bool, bool)> {
        self.publish_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `(url, token)` of the last `connect` call.
    pub fn connected_with(&self) -> Option<(String, String)> {
        self.connected_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MediaRoom for MockRoom {
    async fn connect(&self, url: &str, token: &SecretString) -> Result<(), RoomError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .connected_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner) =
            Some((url.to_string(), token.expose_secret().to_string()));

        match &self.settings.connect {
            ConnectBehavior::Succeed => {
                let _ = self.events.send(RoomEvent::Connected);
                Ok(())
            }
            ConnectBehavior::SucceedSilently => Ok(()),
            ConnectBehavior::Fail(error) => Err(error.clone()),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }

    async fn disconnect(&self) -> Result<(), RoomError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(RoomEvent::Disconnected {
            reason: DisconnectReason::ClientInitiated,
        });
        match &self.settings.disconnect_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn enable_camera_and_microphone(
        &self,
        video: bool,
        audio: bool,
    ) -> Result<(), RoomError> {
        self.publish_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((video, audio));
        match &self.settings.microphone_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Mock audio output that records attached tracks.
#[derive(Debug, Default)]
pub struct MockAudioPlayback {
    error: Option<RoomError>,
    attached: Mutex<Vec<(RemoteTrack, RemoteParticipant)>>,
}

impl MockAudioPlayback {
    /// Create a playback mock that accepts every track.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a playback mock whose autoplay is blocked.
    #[must_use]
    pub fn blocked(reason: &str) -> Self {
        Self {
            error: Some(RoomError::Playback(reason.to_string())),
            attached: Mutex::new(Vec::new()),
        }
    }

    /// Tracks passed to `attach`, in order.
    pub fn attached(&self) -> Vec<(RemoteTrack, RemoteParticipant)> {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AudioPlayback for MockAudioPlayback {
    async fn attach(
        &self,
        track: &RemoteTrack,
        participant: &RemoteParticipant,
    ) -> Result<(), RoomError> {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((track.clone(), participant.clone()));
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
