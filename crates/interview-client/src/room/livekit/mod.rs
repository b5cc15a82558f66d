//! LiveKit implementation of the media room interface.
//!
//! Built with the `livekit` cargo feature.
//!
//! | Type | Implements |
//! |------|------------|
//! | [`LiveKitConnector`] | [`RoomConnector`] |
//! | [`LiveKitRoom`] | [`MediaRoom`] on `livekit::prelude::Room` |
//! | [`LiveKitPlayback`] | [`AudioPlayback`] on the default output device |
//!
//! `Room::connect` hands back the room and its event stream together, so a
//! `LiveKitRoom` stays empty until `connect` succeeds. It then emits
//! `Connected` and forwards translated library events to the receiver
//! returned by `create_room`.
//!
//! Rooms record the remote audio tracks they subscribe to in a registry
//! shared with the connector's playback, which looks tracks up by sid.

pub mod audio;

use self::audio::{MicrophoneCapture, SpeakerOutput};
use super::{
    AudioPlayback, ConnectionState, DisconnectReason, MediaRoom, RemoteParticipant, RemoteTrack,
    RoomConnector, RoomError, RoomEvent, RoomEventReceiver, RoomEventSender, RoomOptions,
    TrackKind, TrackPublication,
};

use ::livekit::options::TrackPublishOptions;
use ::livekit::prelude as lk;
use ::livekit::webrtc::audio_stream::native::NativeAudioStream;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::ParticipantIdentity;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Remote audio tracks subscribed by any room, keyed by track sid.
type SubscribedAudio = Arc<StdMutex<HashMap<String, lk::RemoteAudioTrack>>>;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds [`LiveKitRoom`]s.
#[derive(Clone, Default)]
pub struct LiveKitConnector {
    audio: SubscribedAudio,
}

impl LiveKitConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Playback for the audio tracks this connector's rooms subscribe to.
    #[must_use]
    pub fn playback(&self) -> LiveKitPlayback {
        LiveKitPlayback {
            audio: Arc::clone(&self.audio),
            output: Mutex::new(None),
            streams: StdMutex::new(HashMap::new()),
        }
    }
}

impl RoomConnector for LiveKitConnector {
    fn create_room(&self, options: &RoomOptions) -> (Arc<dyn MediaRoom>, RoomEventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let room = LiveKitRoom {
            options: options.clone(),
            events,
            audio: Arc::clone(&self.audio),
            room: Mutex::new(None),
            microphone: Mutex::new(None),
            closing: CancellationToken::new(),
        };
        (Arc::new(room), receiver)
    }
}

#[allow(clippy::field_reassign_with_default)]
fn library_options(options: &RoomOptions) -> lk::RoomOptions {
    let mut library = lk::RoomOptions::default();
    library.auto_subscribe = true;
    library.adaptive_stream = options.adaptive_stream;
    library.dynacast = options.dynacast;
    library
}

/// One LiveKit room.
pub struct LiveKitRoom {
    options: RoomOptions,
    events: RoomEventSender,
    audio: SubscribedAudio,
    room: Mutex<Option<lk::Room>>,
    microphone: Mutex<Option<MicrophoneCapture>>,
    /// Cancelled by `disconnect`; stops the event forwarder.
    closing: CancellationToken,
}

#[async_trait]
impl MediaRoom for LiveKitRoom {
    async fn connect(&self, url: &str, token: &SecretString) -> Result<(), RoomError> {
        let mut slot = self.room.lock().await;
        if self.closing.is_cancelled() {
            return Err(RoomError::Closed);
        }
        if slot.is_some() {
            return Ok(());
        }

        let connected = tokio::select! {
            biased;
            () = self.closing.cancelled() => return Err(RoomError::Closed),
            result = lk::Room::connect(url, token.expose_secret(), library_options(&self.options)) => result,
        };
        let (room, library_events) =
            connected.map_err(|e| RoomError::ConnectFailed(e.to_string()))?;
        info!(target: "interview.room", "Connected to media server");

        *slot = Some(room);
        let _ = self.events.send(RoomEvent::Connected);
        tokio::spawn(forward_events(
            library_events,
            self.events.clone(),
            Arc::clone(&self.audio),
            self.closing.clone(),
        ));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RoomError> {
        self.closing.cancel();
        self.microphone.lock().await.take();
        let room = self.room.lock().await.take();

        let result = match room {
            Some(room) => room
                .close()
                .await
                .map_err(|e| RoomError::Transport(e.to_string())),
            None => Ok(()),
        };
        let _ = self.events.send(RoomEvent::Disconnected {
            reason: DisconnectReason::ClientInitiated,
        });
        result
    }

    async fn enable_camera_and_microphone(
        &self,
        video: bool,
        audio: bool,
    ) -> Result<(), RoomError> {
        if video {
            return Err(RoomError::Device(
                "camera capture is not supported".to_string(),
            ));
        }
        if !audio {
            return Ok(());
        }

        let mut microphone = self.microphone.lock().await;
        if microphone.is_some() {
            return Ok(());
        }

        let capture = MicrophoneCapture::start().await?;
        let track = lk::LocalAudioTrack::create_audio_track("microphone", capture.rtc_source());
        let options = TrackPublishOptions {
            source: lk::TrackSource::Microphone,
            ..Default::default()
        };
        {
            let room = self.room.lock().await;
            let room = room.as_ref().ok_or(RoomError::Closed)?;
            room.local_participant()
                .publish_track(lk::LocalTrack::Audio(track), options)
                .await
                .map_err(|e| RoomError::PublishFailed(e.to_string()))?;
        }

        *microphone = Some(capture);
        info!(target: "interview.room", "Microphone track published");
        Ok(())
    }
}

impl Drop for LiveKitRoom {
    fn drop(&mut self) {
        self.closing.cancel();
    }
}

async fn forward_events(
    mut library: mpsc::UnboundedReceiver<lk::RoomEvent>,
    events: RoomEventSender,
    audio: SubscribedAudio,
    closing: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = closing.cancelled() => break,
            event = library.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        if let Some(event) = translate_library_event(event, &audio) {
            if events.send(event).is_err() {
                break;
            }
        }
    }
    debug!(target: "interview.room", "Room event forwarder stopped");
}

fn remote_participant(participant: &lk::RemoteParticipant) -> RemoteParticipant {
    RemoteParticipant {
        identity: ParticipantIdentity::new(participant.identity().to_string()),
    }
}

fn translate_library_event(event: lk::RoomEvent, audio: &SubscribedAudio) -> Option<RoomEvent> {
    match event {
        lk::RoomEvent::Disconnected { reason, .. } => Some(RoomEvent::Disconnected {
            reason: DisconnectReason::from_wire_code(reason.as_str_name()),
        }),
        lk::RoomEvent::ConnectionStateChanged(state) => {
            Some(RoomEvent::ConnectionStateChanged(match state {
                lk::ConnectionState::Disconnected => ConnectionState::Disconnected,
                lk::ConnectionState::Connected => ConnectionState::Connected,
                lk::ConnectionState::Reconnecting => ConnectionState::Reconnecting,
            }))
        }
        lk::RoomEvent::ParticipantConnected(participant) => Some(RoomEvent::ParticipantConnected(
            remote_participant(&participant),
        )),
        lk::RoomEvent::TrackSubscribed {
            track,
            publication,
            participant,
            ..
        } => {
            let sid = track.sid().to_string();
            let kind = match track {
                lk::RemoteTrack::Audio(audio_track) => {
                    lock(audio).insert(sid.clone(), audio_track);
                    TrackKind::Audio
                }
                lk::RemoteTrack::Video(_) => TrackKind::Video,
            };
            Some(RoomEvent::TrackSubscribed {
                track: RemoteTrack { sid, kind },
                publication: TrackPublication {
                    sid: publication.sid().to_string(),
                    name: publication.name(),
                },
                participant: remote_participant(&participant),
            })
        }
        lk::RoomEvent::TrackUnsubscribed { track, .. } => {
            lock(audio).remove(&track.sid().to_string());
            None
        }
        _ => None,
    }
}

/// Plays subscribed remote audio on the default output device.
///
/// The device is opened on the first `attach`.
pub struct LiveKitPlayback {
    audio: SubscribedAudio,
    output: Mutex<Option<SpeakerOutput>>,
    streams: StdMutex<HashMap<String, JoinHandle<()>>>,
}

#[async_trait]
impl AudioPlayback for LiveKitPlayback {
    async fn attach(
        &self,
        track: &RemoteTrack,
        participant: &RemoteParticipant,
    ) -> Result<(), RoomError> {
        if track.kind != TrackKind::Audio {
            return Ok(());
        }
        let remote = lock(&self.audio)
            .get(&track.sid)
            .cloned()
            .ok_or_else(|| RoomError::Playback(format!("track {} is not subscribed", track.sid)))?;

        let (sink, format) = {
            let mut output = self.output.lock().await;
            let speaker = match output.take() {
                Some(speaker) => speaker,
                None => SpeakerOutput::start().await?,
            };
            let opened = (speaker.sink(), speaker.format());
            *output = Some(speaker);
            opened
        };

        let mut stream = NativeAudioStream::new(
            remote.rtc_track(),
            i32::try_from(format.sample_rate).unwrap_or(48_000),
            i32::from(format.channels),
        );
        let sid = track.sid.clone();
        let task = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                sink.push(&frame.data);
            }
            debug!(target: "interview.audio", track = %sid, "Remote audio stream ended");
        });

        if let Some(previous) = lock(&self.streams).insert(track.sid.clone(), task) {
            warn!(target: "interview.audio", track = %track.sid, "Replacing playback for track");
            previous.abort();
        }
        info!(
            target: "interview.audio",
            participant = %participant.identity,
            track = %track.sid,
            "Playing remote audio"
        );
        Ok(())
    }
}

impl Drop for LiveKitPlayback {
    fn drop(&mut self) {
        for (_, task) in lock(&self.streams).drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_library_options_follow_room_options() {
        let options = RoomOptions {
            adaptive_stream: false,
            ..RoomOptions::default()
        };
        let library = library_options(&options);
        assert!(library.auto_subscribe);
        assert!(!library.adaptive_stream);
        assert!(library.dynacast);
    }

    #[tokio::test]
    async fn test_unconnected_room_disconnects_cleanly() {
        let connector = LiveKitConnector::new();
        let (room, mut events) = connector.create_room(&RoomOptions::default());

        room.disconnect().await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(RoomEvent::Disconnected {
                reason: DisconnectReason::ClientInitiated
            })
        );
        let token: SecretString = "unused".into();
        assert_eq!(
            room.connect("wss://media.local", &token).await,
            Err(RoomError::Closed)
        );
    }

    #[tokio::test]
    async fn test_microphone_requires_connected_room() {
        let connector = LiveKitConnector::new();
        let (room, _events) = connector.create_room(&RoomOptions::default());

        assert!(matches!(
            room.enable_camera_and_microphone(true, true).await,
            Err(RoomError::Device(_))
        ));
        assert_eq!(room.enable_camera_and_microphone(false, false).await, Ok(()));
    }

    #[tokio::test]
    async fn test_playback_rejects_unknown_track() {
        let playback = LiveKitConnector::new().playback();
        let participant = RemoteParticipant {
            identity: ParticipantIdentity::from("agent-1"),
        };

        let err = playback
            .attach(
                &RemoteTrack {
                    sid: "TR_missing".to_string(),
                    kind: TrackKind::Audio,
                },
                &participant,
            )
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::Playback("track TR_missing is not subscribed".to_string()));

        let video = RemoteTrack {
            sid: "TR_video".to_string(),
            kind: TrackKind::Video,
        };
        assert_eq!(playback.attach(&video, &participant).await, Ok(()));
    }
}
