//! Local audio devices backing the LiveKit adapter.
//!
//! cpal streams are not `Send`. Each stream is built, played and dropped on
//! its own thread, which parks until its [`DeviceThread`] guard is dropped.

use crate::room::RoomError;

use ::livekit::webrtc::audio_frame::AudioFrame;
use ::livekit::webrtc::audio_source::native::NativeAudioSource;
use ::livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callback buffers queued between the input device and the audio source.
const CAPTURE_QUEUE_BUFFERS: usize = 64;

/// Queue held inside the native audio source.
const SOURCE_QUEUE_MS: u32 = 1000;

/// Playback buffer bound; older samples are dropped first.
const PLAYBACK_BUFFER_SECONDS: usize = 1;

/// Format of a running device stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Stops its device thread when dropped.
#[derive(Debug)]
struct DeviceThread {
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for DeviceThread {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Run `build` on a dedicated thread and keep the stream it returns playing.
async fn spawn_device<B>(
    device: &'static str,
    build: B,
) -> Result<(DeviceThread, StreamFormat), RoomError>
where
    B: FnOnce() -> Result<(cpal::Stream, StreamFormat), RoomError> + Send + 'static,
{
    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    std::thread::Builder::new()
        .name(format!("audio-{device}"))
        .spawn(move || {
            let started = build().and_then(|(stream, format)| {
                stream
                    .play()
                    .map_err(|e| RoomError::Device(format!("failed to start {device}: {e}")))?;
                Ok((stream, format))
            });
            let stream = match started {
                Ok((stream, format)) => {
                    let _ = ready_tx.send(Ok(format));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let _ = shutdown_rx.blocking_recv();
            drop(stream);
            debug!(target: "interview.audio", device, "Audio stream stopped");
        })
        .map_err(|e| RoomError::Device(format!("failed to spawn {device} thread: {e}")))?;

    let format = ready_rx
        .await
        .map_err(|_| RoomError::Device(format!("{device} thread exited")))??;
    info!(
        target: "interview.audio",
        device,
        sample_rate = format.sample_rate,
        channels = format.channels,
        "Audio stream started"
    );

    Ok((
        DeviceThread {
            shutdown: Some(shutdown_tx),
        },
        format,
    ))
}

#[allow(clippy::cast_possible_truncation)]
fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / f32::from(i16::MAX)
}

fn stream_error(device: &'static str) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |e| error!(target: "interview.audio", device, error = %e, "Audio stream error")
}

fn build_input(
    samples: mpsc::Sender<Vec<i16>>,
) -> Result<(cpal::Stream, StreamFormat), RoomError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| RoomError::Device("no input device available".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| RoomError::PermissionDenied(e.to_string()))?;
    let format = StreamFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };
    let config: cpal::StreamConfig = supported.clone().into();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // A full queue drops the buffer.
                let _ = samples.try_send(data.iter().copied().map(f32_to_i16).collect());
            },
            stream_error("microphone"),
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = samples.try_send(data.to_vec());
            },
            stream_error("microphone"),
            None,
        ),
        other => {
            return Err(RoomError::Device(format!(
                "unsupported input sample format {other:?}"
            )))
        }
    }
    .map_err(|e| RoomError::PermissionDenied(e.to_string()))?;

    Ok((stream, format))
}

/// Default input device feeding a LiveKit audio source.
pub struct MicrophoneCapture {
    source: NativeAudioSource,
    feed: JoinHandle<()>,
    _thread: DeviceThread,
}

impl MicrophoneCapture {
    /// Open the default input device.
    ///
    /// # Errors
    ///
    /// `RoomError::Device` or `RoomError::PermissionDenied` if the device
    /// cannot be opened.
    pub async fn start() -> Result<Self, RoomError> {
        let (samples_tx, mut samples_rx) = mpsc::channel::<Vec<i16>>(CAPTURE_QUEUE_BUFFERS);
        let (thread, format) = spawn_device("microphone", move || build_input(samples_tx)).await?;

        let channels = u32::from(format.channels.max(1));
        let source = NativeAudioSource::new(
            AudioSourceOptions::default(),
            format.sample_rate,
            channels,
            SOURCE_QUEUE_MS,
        );

        let target = source.clone();
        let feed = tokio::spawn(async move {
            while let Some(samples) = samples_rx.recv().await {
                let per_channel = samples.len() / channels as usize;
                let frame = AudioFrame {
                    samples_per_channel: u32::try_from(per_channel).unwrap_or(u32::MAX),
                    data: samples.into(),
                    sample_rate: format.sample_rate,
                    num_channels: channels,
                };
                if let Err(e) = target.capture_frame(&frame).await {
                    warn!(target: "interview.audio", error = %e, "Dropped microphone frame");
                }
            }
        });

        Ok(Self {
            source,
            feed,
            _thread: thread,
        })
    }

    /// Source to back a local audio track with.
    #[must_use]
    pub fn rtc_source(&self) -> RtcAudioSource {
        RtcAudioSource::Native(self.source.clone())
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.feed.abort();
    }
}

/// Write side of the speaker's sample buffer.
#[derive(Debug, Clone)]
pub struct SpeakerSink {
    buffer: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl SpeakerSink {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Queue interleaved samples for playback.
    pub fn push(&self, samples: &[i16]) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.extend(samples.iter().copied().map(i16_to_f32));
        let excess = buffer.len().saturating_sub(self.capacity);
        buffer.drain(..excess);
    }

    fn fill(&self, out: &mut [f32]) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        for sample in out.iter_mut() {
            *sample = buffer.pop_front().unwrap_or(0.0);
        }
    }

    fn queued(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn build_output(
    buffer: Arc<Mutex<Option<SpeakerSink>>>,
) -> Result<(cpal::Stream, StreamFormat), RoomError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| RoomError::Playback("no output device available".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| RoomError::Playback(e.to_string()))?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(RoomError::Playback(format!(
            "unsupported output sample format {:?}",
            supported.sample_format()
        )));
    }

    let format = StreamFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };
    let capacity =
        format.sample_rate as usize * usize::from(format.channels) * PLAYBACK_BUFFER_SECONDS;
    let sink = SpeakerSink::new(capacity);
    *buffer.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink.clone());

    let config: cpal::StreamConfig = supported.into();
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| sink.fill(data),
            stream_error("speaker"),
            None,
        )
        .map_err(|e| RoomError::Playback(e.to_string()))?;

    Ok((stream, format))
}

/// Default output device playing queued remote audio.
#[derive(Debug)]
pub struct SpeakerOutput {
    sink: SpeakerSink,
    format: StreamFormat,
    _thread: DeviceThread,
}

impl SpeakerOutput {
    /// Open the default output device.
    ///
    /// # Errors
    ///
    /// `RoomError::Playback` if no usable output device exists.
    pub async fn start() -> Result<Self, RoomError> {
        let slot = Arc::new(Mutex::new(None));
        let built = Arc::clone(&slot);
        let (thread, format) = spawn_device("speaker", move || build_output(built)).await?;

        let sink = slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| RoomError::Playback("speaker buffer missing".to_string()))?;
        Ok(Self {
            sink,
            format,
            _thread: thread,
        })
    }

    #[must_use]
    pub fn sink(&self) -> SpeakerSink {
        self.sink.clone()
    }

    #[must_use]
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Samples waiting to be played.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.sink.queued()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_conversion_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(3.5), i16::MAX);
        assert_eq!(f32_to_i16(-3.5), -i16::MAX);
        assert!((i16_to_f32(i16::MAX) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_sink_drops_oldest_samples_past_capacity() {
        let sink = SpeakerSink::new(4);
        sink.push(&[1, 2, 3]);
        sink.push(&[4, 5, 6]);
        assert_eq!(sink.queued(), 4);

        let mut out = [0.0; 6];
        sink.fill(&mut out);
        assert!((out[0] - i16_to_f32(3)).abs() < f32::EPSILON);
        assert!((out[3] - i16_to_f32(6)).abs() < f32::EPSILON);
        assert_eq!(&out[4..], &[0.0, 0.0]);
        assert_eq!(sink.queued(), 0);
    }
}
