//! Recording container → canonical 16 kHz mono WAV.
//!
//! # Pipeline
//!
//! ```text
//! RecordedTake bytes ──decode_audio──▶ DecodedAudioBuffer (native rate, N ch)
//!                    ──channel 0 + resample──▶ 16 kHz mono f32
//!                    ──encode_wav──▶ WavAudio (44-byte header + i16 PCM)
//! ```
//!
//! Any failing step aborts the conversion; no partial [`WavAudio`] is ever
//! returned.

use thiserror::Error;

use crate::audio::decode::{decode_audio, DecodeError, DecodedAudioBuffer};
use crate::audio::resample::{resample, ResampleError};
use crate::audio::session::RecordedTake;
use crate::audio::wav::{encode_wav, WavAudio};
use crate::config::{ResampleMode, TranscodeConfig};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Resample(#[from] ResampleError),
}

/// Converts recorded takes into upload-ready WAV streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transcoder {
    mode: ResampleMode,
}

impl Transcoder {
    pub fn new(mode: ResampleMode) -> Self {
        Self { mode }
    }

    pub fn from_config(config: &TranscodeConfig) -> Self {
        Self::new(config.resample_mode)
    }

    pub fn mode(&self) -> ResampleMode {
        self.mode
    }

    /// Decode, resample and encode a finished take.
    pub fn transcode(&self, take: &RecordedTake) -> Result<WavAudio, TranscodeError> {
        self.transcode_bytes(take.bytes(), Some(take.mime()))
    }

    /// Same as [`transcode`](Self::transcode) for raw container bytes.
    pub fn transcode_bytes(
        &self,
        bytes: &[u8],
        mime_hint: Option<&str>,
    ) -> Result<WavAudio, TranscodeError> {
        let decoded = decode_audio(bytes, mime_hint)?;
        self.transcode_pcm(&decoded)
    }

    /// Skip decoding for callers that already hold PCM.
    ///
    /// Channel 0 is the mono signal; other channels are ignored.
    pub fn transcode_pcm(&self, buffer: &DecodedAudioBuffer) -> Result<WavAudio, TranscodeError> {
        let mono = resample(buffer.channel(0), buffer.sample_rate(), self.mode)?;
        let wav = encode_wav(&mono);
        log::debug!(
            "transcoded {:.2}s @ {} Hz ({} ch) → {} samples @ 16 kHz, {} bytes ({:?})",
            buffer.duration_secs(),
            buffer.sample_rate(),
            buffer.channel_count(),
            wav.sample_count(),
            wav.len(),
            self.mode
        );
        Ok(wav)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
