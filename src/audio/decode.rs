//! Container decoding via `symphonia`.
//!
//! [`decode_audio`] probes an in-memory recording, decodes its first audio
//! track and returns planar `f32` PCM at whatever rate the codec produces.
//! Any container/codec enabled in `symphonia`'s feature set is accepted (WAV,
//! FLAC, Ogg Vorbis, MP3, MKV/WebM with a supported codec, …).

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// The recording could not be turned back into PCM.
///
/// Terminal for the take: the user has to record again.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("recording is empty")]
    EmptyInput,

    #[error("unrecognised audio container: {0}")]
    UnsupportedFormat(String),

    #[error("recording has no decodable audio track")]
    NoAudioTrack,

    #[error("recording does not declare a sample rate")]
    UnknownSampleRate,

    #[error("failed to decode audio: {0}")]
    Codec(String),
}

// ---------------------------------------------------------------------------
// DecodedAudioBuffer
// ---------------------------------------------------------------------------

/// Planar PCM at the decoder's native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedAudioBuffer {
    /// Build a buffer from planar channel data.
    ///
    /// Channels shorter than the first are zero-padded so every channel has
    /// the same frame count.
    pub fn new(sample_rate: u32, mut channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.first().map_or(0, Vec::len);
        for ch in channels.iter_mut() {
            ch.resize(frames, 0.0);
        }
        Self {
            sample_rate,
            channels,
        }
    }

    /// Convenience constructor for a single channel.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    /// Split interleaved samples into planar channels.
    pub fn from_interleaved(sample_rate: u32, channels: u16, samples: &[f32]) -> Self {
        let n = channels.max(1) as usize;
        let mut planar = vec![Vec::with_capacity(samples.len() / n); n];
        for frame in samples.chunks_exact(n) {
            for (ch, &s) in planar.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self::new(sample_rate, planar)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Samples of channel `index`, or an empty slice if absent.
    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels.get(index).map_or(&[], Vec::as_slice)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

// ---------------------------------------------------------------------------
// decode_audio
// ---------------------------------------------------------------------------

/// Decode a complete recording held in memory.
///
/// `mime_hint` (e.g. `"audio/wav"`, `"audio/webm"`) speeds up probing but is
/// not required.  Packets that fail to decode are skipped; a container that
/// cannot be probed, has no audio track, or yields no usable packets at all
/// is an error.
///
/// # Errors
///
/// Returns a [`DecodeError`] and no partial output on failure.
pub fn decode_audio(bytes: &[u8], mime_hint: Option<&str>) -> Result<DecodedAudioBuffer, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(mime) = mime_hint {
        hint.mime_type(mime);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channel_count = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Codec(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut decoded_packets = 0usize;
    let mut failed_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channel_count.get_or_insert(spec.channels.count());

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(sample_buf.samples());
                decoded_packets += 1;
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("skipping corrupt audio packet: {e}");
                failed_packets += 1;
            }
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        }
    }

    if decoded_packets == 0 && failed_packets > 0 {
        return Err(DecodeError::Codec(format!(
            "all {failed_packets} audio packets were corrupt"
        )));
    }

    let sample_rate = sample_rate.ok_or(DecodeError::UnknownSampleRate)?;
    let channels = channel_count.unwrap_or(1).max(1) as u16;

    let buffer = DecodedAudioBuffer::from_interleaved(sample_rate, channels, &interleaved);
    log::debug!(
        "decoded {} frames @ {} Hz, {} ch ({:.2}s)",
        buffer.frames(),
        buffer.sample_rate(),
        buffer.channel_count(),
        buffer.duration_secs()
    );
    Ok(buffer)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
