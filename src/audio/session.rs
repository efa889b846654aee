//! Per-take chunk accumulation.
//!
//! A [`RecordingSession`] owns every chunk captured during one take, in
//! capture order.  [`RecordingSession::finalize`] is the only way to get the
//! audio out: it closes the session to further chunks and packs the samples
//! into an immutable [`RecordedTake`] container blob.
//!
//! ```text
//! Idle ──start──▶ Recording ──finalize──▶ Stopped
//!                    │ push_chunk (in order)
//! ```

use std::io::Cursor;

use thiserror::Error;

/// MIME type of containers produced by [`RecordingSession::finalize`].
pub const TAKE_MIME: &str = "audio/wav";

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the capture callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// RecordingState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Stopped,
}

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("recording session is not accepting audio (state: {0:?})")]
    NotRecording(RecordingState),

    #[error("chunk format {got_rate} Hz / {got_channels} ch does not match session {rate} Hz / {channels} ch")]
    FormatMismatch {
        rate: u32,
        channels: u16,
        got_rate: u32,
        got_channels: u16,
    },

    #[error("failed to write take container: {0}")]
    Container(#[from] hound::Error),
}

// ---------------------------------------------------------------------------
// RecordedTake
// ---------------------------------------------------------------------------

/// The finished, immutable blob for one take.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTake {
    bytes: Vec<u8>,
    mime: &'static str,
    sample_rate: u32,
    channels: u16,
    frames: usize,
}

impl RecordedTake {
    /// Wrap an existing container (e.g. a file loaded from disk).
    ///
    /// Format metadata is unknown until the bytes are decoded, so it reads
    /// as zero.
    pub fn from_container(bytes: Vec<u8>, mime: &'static str) -> Self {
        Self {
            bytes,
            mime,
            sample_rate: 0,
            channels: 0,
            frames: 0,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    /// Capture rate in Hz (0 when built with [`from_container`](Self::from_container)).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Captured duration in seconds (0 when unknown).
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// RecordingSession
// ---------------------------------------------------------------------------

/// Accumulates the chunks of one take.
#[derive(Debug, Default)]
pub struct RecordingSession {
    chunks: Vec<Vec<f32>>,
    state: RecordingState,
    sample_rate: u32,
    channels: u16,
    /// Chunks are refused once this many frames have been captured.
    max_frames: Option<usize>,
    frames: usize,
}

impl RecordingSession {
    /// An idle session; call [`start`](Self::start) before pushing chunks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin accepting chunks in the given format.
    ///
    /// Restarting a session discards whatever it held.
    pub fn start(&mut self, sample_rate: u32, channels: u16, max_secs: Option<f32>) {
        self.chunks.clear();
        self.frames = 0;
        self.sample_rate = sample_rate;
        self.channels = channels.max(1);
        self.max_frames = max_secs.map(|s| (s.max(0.0) as f64 * sample_rate as f64).round() as usize);
        self.state = RecordingState::Recording;
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Frames captured so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Append the next chunk in capture order.
    ///
    /// Audio past the configured maximum length is dropped silently.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRecording`] before `start` or after `finalize`;
    /// [`SessionError::FormatMismatch`] when the chunk's format differs from
    /// the session's.
    pub fn push_chunk(&mut self, chunk: AudioChunk) -> Result<(), SessionError> {
        if self.state != RecordingState::Recording {
            return Err(SessionError::NotRecording(self.state));
        }
        if chunk.sample_rate != self.sample_rate || chunk.channels != self.channels {
            return Err(SessionError::FormatMismatch {
                rate: self.sample_rate,
                channels: self.channels,
                got_rate: chunk.sample_rate,
                got_channels: chunk.channels,
            });
        }

        let mut samples = chunk.samples;
        let ch = self.channels as usize;
        if let Some(max) = self.max_frames {
            let room = max.saturating_sub(self.frames);
            if room == 0 {
                return Ok(());
            }
            samples.truncate(room * ch);
        }

        self.frames += samples.len() / ch;
        self.chunks.push(samples);
        Ok(())
    }

    /// Close the session and pack every chunk, in order, into a 32-bit
    /// float WAV container at the capture rate and channel count.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRecording`] unless the session is recording;
    /// [`SessionError::Container`] if the container cannot be written.
    pub fn finalize(&mut self) -> Result<RecordedTake, SessionError> {
        if self.state != RecordingState::Recording {
            return Err(SessionError::NotRecording(self.state));
        }
        self.state = RecordingState::Stopped;

        let chunks = std::mem::take(&mut self.chunks);
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for sample in chunks.iter().flatten() {
                writer.write_sample(*sample)?;
            }
            writer.finalize()?;
        }

        log::debug!(
            "take finalized: {} chunks, {} frames @ {} Hz, {} ch",
            chunks.len(),
            self.frames,
            self.sample_rate,
            self.channels
        );

        Ok(RecordedTake {
            bytes: cursor.into_inner(),
            mime: TAKE_MIME,
            sample_rate: self.sample_rate,
            channels: self.channels,
            frames: self.frames,
        })
    }

    /// Drop everything captured and return to idle.
    pub fn discard(&mut self) {
        self.chunks.clear();
        self.frames = 0;
        self.state = RecordingState::Idle;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
