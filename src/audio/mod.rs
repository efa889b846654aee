//! Audio pipeline: microphone capture → take container → decode → 16 kHz
//! resample → canonical WAV.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → RecordingSession
//!           → finalize → RecordedTake → Transcoder (decode → resample)
//!           → encode_wav → WavAudio
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use nihao_voice::audio::{CaptureConstraints, Recorder, Transcoder};
//!
//! let recorder = Recorder::new(CaptureConstraints::default()).unwrap();
//! let recording = recorder.start().unwrap();
//! // ... user speaks ...
//! let take = recording.stop().unwrap();
//! let wav = Transcoder::default().transcode(&take).unwrap();
//! assert_eq!(&wav.as_bytes()[0..4], b"RIFF");
//! ```

pub mod capture;
pub mod decode;
pub mod playback;
pub mod resample;
pub mod session;
pub mod transcode;
pub mod wav;

pub use capture::{ActiveRecording, CaptureConstraints, CaptureError, Recorder};
pub use decode::{decode_audio, DecodeError, DecodedAudioBuffer};
pub use playback::{PlaybackError, PlaybackUrl};
pub use resample::{resample, ResampleError, TARGET_RATE};
pub use session::{AudioChunk, RecordedTake, RecordingSession, RecordingState, SessionError};
pub use transcode::{TranscodeError, Transcoder};
pub use wav::{encode_wav, WavAudio, WAV_MIME};
