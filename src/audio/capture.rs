//! Microphone capture via `cpal`.
//!
//! [`Recorder`] resolves an input device and stream configuration from a set
//! of [`CaptureConstraints`].  [`Recorder::start`] opens the device and
//! returns an [`ActiveRecording`], which holds the OS-level stream for the
//! lifetime of the take.  The stream is released on [`ActiveRecording::stop`],
//! on [`ActiveRecording::discard`], and when the value is dropped.
//!
//! ```rust,no_run
//! use nihao_voice::audio::{CaptureConstraints, Recorder};
//!
//! let recorder = Recorder::new(CaptureConstraints::default()).unwrap();
//! let recording = recorder.start().unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! let take = recording.stop().unwrap();
//! println!("{:.1}s captured", take.duration_secs());
//! ```

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample};
use thiserror::Error;

use crate::audio::session::{AudioChunk, RecordedTake, RecordingSession, SessionError};
use crate::config::CaptureConfig;

// ---------------------------------------------------------------------------
// CaptureConstraints
// ---------------------------------------------------------------------------

/// What the caller would like from the input device.
///
/// `sample_rate` and `channels` are matched against the device's supported
/// configurations; when nothing matches the device default is used and the
/// transcoder resamples later.  `echo_cancellation` and `noise_suppression`
/// are forwarded as hints only: cpal exposes no host DSP controls.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConstraints {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    /// Input device name; `None` selects the host default.
    pub device: Option<String>,
    /// Upper bound on take length in seconds.
    pub max_recording_secs: Option<f32>,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for CaptureConstraints {
    fn from(cfg: &CaptureConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate_hint,
            channels: cfg.channels_hint,
            echo_cancellation: cfg.echo_cancellation,
            noise_suppression: cfg.noise_suppression,
            device: cfg.device.clone(),
            max_recording_secs: (cfg.max_recording_secs > 0.0).then_some(cfg.max_recording_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening or running the microphone.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The platform refused microphone access.  Needs user action.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// No usable input device exists (none attached, or it disappeared).
    #[error("no microphone available: {0}")]
    DeviceUnavailable(String),

    /// The device does not offer a sample format we can read.
    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    /// Any other stream failure reported by the host.
    #[error("audio stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl CaptureError {
    /// `true` for the errors the user must fix outside the app (grant
    /// permission, attach a device) before retrying.
    pub fn needs_user_action(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied(_) | CaptureError::DeviceUnavailable(_)
        )
    }
}

/// Sort a backend-specific message into permission vs. generic failures.
fn classify_backend(description: String) -> CaptureError {
    let lower = description.to_lowercase();
    let permission = ["permission", "denied", "not authorized", "unauthorized", "not permitted"]
        .iter()
        .any(|needle| lower.contains(needle));
    if permission {
        CaptureError::PermissionDenied(description)
    } else {
        CaptureError::Stream(description)
    }
}

impl From<cpal::DefaultStreamConfigError> for CaptureError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable("input device is no longer available".into())
            }
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                CaptureError::DeviceUnavailable("device has no input stream".into())
            }
            cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                classify_backend(err.description)
            }
        }
    }
}

impl From<cpal::BuildStreamError> for CaptureError {
    fn from(e: cpal::BuildStreamError) -> Self {
        match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable("input device is no longer available".into())
            }
            cpal::BuildStreamError::BackendSpecific { err } => classify_backend(err.description),
            other => CaptureError::Stream(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for CaptureError {
    fn from(e: cpal::PlayStreamError) -> Self {
        match e {
            cpal::PlayStreamError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable("input device is no longer available".into())
            }
            cpal::PlayStreamError::BackendSpecific { err } => classify_backend(err.description),
        }
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Resolved input device plus stream configuration.
pub struct Recorder {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    constraints: CaptureConstraints,
}

impl Recorder {
    /// Resolve the input device and the closest stream configuration.
    ///
    /// # Errors
    ///
    /// [`CaptureError::DeviceUnavailable`] when no input device exists (or the
    /// named one is missing); [`CaptureError::PermissionDenied`] when the
    /// host reports a permission failure while querying it.
    pub fn new(constraints: CaptureConstraints) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match constraints.device.as_deref() {
            Some(name) => find_device_by_name(&host, name)?,
            None => host.default_input_device().ok_or_else(|| {
                CaptureError::DeviceUnavailable("no input device on the default audio host".into())
            })?,
        };

        let supported = preferred_config(&device, &constraints)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        if constraints.echo_cancellation || constraints.noise_suppression {
            log::debug!(
                "capture hints: echo_cancellation={}, noise_suppression={} (left to the host)",
                constraints.echo_cancellation,
                constraints.noise_suppression
            );
        }

        Ok(Self {
            device,
            config,
            sample_format,
            constraints,
        })
    }

    /// Open the device and begin accumulating a new take.
    ///
    /// The cpal callback runs on the host audio thread; each buffer is
    /// converted to `f32` and forwarded over an mpsc channel, which keeps
    /// chunks in capture order.
    ///
    /// # Errors
    ///
    /// [`CaptureError::PermissionDenied`], [`CaptureError::DeviceUnavailable`]
    /// or [`CaptureError::Stream`] if the platform rejects the stream.
    pub fn start(&self) -> Result<ActiveRecording, CaptureError> {
        let (tx, rx) = mpsc::channel::<AudioChunk>();
        let rate = self.sample_rate();
        let channels = self.channels();

        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(tx)?,
            cpal::SampleFormat::I16 => self.build_stream::<i16>(tx)?,
            cpal::SampleFormat::U16 => self.build_stream::<u16>(tx)?,
            cpal::SampleFormat::I32 => self.build_stream::<i32>(tx)?,
            other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
        };
        stream.play()?;

        let mut session = RecordingSession::new();
        session.start(rate, channels, self.constraints.max_recording_secs);

        log::info!("recording started ({rate} Hz, {channels} ch)");
        Ok(ActiveRecording {
            stream: Some(stream),
            rx,
            session,
            sample_rate: rate,
        })
    }

    fn build_stream<T>(&self, tx: mpsc::Sender<AudioChunk>) -> Result<cpal::Stream, CaptureError>
    where
        T: SizedSample,
        f32: cpal::FromSample<T>,
    {
        let sample_rate = self.sample_rate();
        let channels = self.channels();

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk = AudioChunk {
                    samples: data.iter().map(|&s| f32::from_sample(s)).collect(),
                    sample_rate,
                    channels,
                };
                // Receiver gone means the take was stopped or discarded.
                let _ = tx.send(chunk);
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None,
        )?;
        Ok(stream)
    }

    /// Capture rate in Hz actually negotiated with the device.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Interleaved channel count actually negotiated with the device.
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }
}

fn find_device_by_name(host: &cpal::Host, name: &str) -> Result<cpal::Device, CaptureError> {
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
    for device in devices {
        if device.name().is_ok_and(|n| n == name) {
            return Ok(device);
        }
    }
    Err(CaptureError::DeviceUnavailable(format!(
        "input device '{name}' not found"
    )))
}

/// Pick a supported configuration matching the constraint hints, otherwise
/// fall back to the device default.
fn preferred_config(
    device: &cpal::Device,
    constraints: &CaptureConstraints,
) -> Result<cpal::SupportedStreamConfig, CaptureError> {
    let wanted = cpal::SampleRate(constraints.sample_rate);

    if let Ok(ranges) = device.supported_input_configs() {
        let matching = ranges
            .filter(|r| r.channels() == constraints.channels)
            .filter(|r| r.min_sample_rate() <= wanted && wanted <= r.max_sample_rate())
            .find(|r| {
                matches!(
                    r.sample_format(),
                    cpal::SampleFormat::F32 | cpal::SampleFormat::I16
                )
            });
        if let Some(range) = matching {
            return Ok(range.with_sample_rate(wanted));
        }
    }

    let fallback = device.default_input_config()?;
    log::info!(
        "device has no {} Hz / {} ch input; using default {} Hz / {} ch",
        constraints.sample_rate,
        constraints.channels,
        fallback.sample_rate().0,
        fallback.channels()
    );
    Ok(fallback)
}

// ---------------------------------------------------------------------------
// ActiveRecording
// ---------------------------------------------------------------------------

/// A take in progress.  Holds the input device until stopped or dropped.
pub struct ActiveRecording {
    stream: Option<cpal::Stream>,
    rx: mpsc::Receiver<AudioChunk>,
    session: RecordingSession,
    sample_rate: u32,
}

impl ActiveRecording {
    /// Move chunks delivered so far into the session; returns how many.
    pub fn pump(&mut self) -> Result<usize, CaptureError> {
        let mut moved = 0;
        while let Ok(chunk) = self.rx.try_recv() {
            self.session.push_chunk(chunk)?;
            moved += 1;
        }
        Ok(moved)
    }

    /// Seconds captured so far (as of the last [`pump`](Self::pump)).
    pub fn elapsed_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.session.frames() as f32 / self.sample_rate as f32
    }

    /// Release the device, collect every remaining chunk in order, and
    /// finalize the take.
    pub fn stop(mut self) -> Result<RecordedTake, CaptureError> {
        self.release();
        self.pump()?;
        let take = self.session.finalize()?;
        log::info!("recording stopped ({:.2}s)", take.duration_secs());
        Ok(take)
    }

    /// Release the device and throw the audio away.
    pub fn discard(mut self) {
        self.release();
        self.session.discard();
        log::info!("recording discarded");
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("failed to pause input stream: {e}");
            }
            drop(stream);
        }
    }
}

impl Drop for ActiveRecording {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
