//! Canonical 16 kHz mono 16-bit PCM WAV encoding.
//!
//! The scoring backend expects exactly this layout (all little-endian):
//!
//! | Offset | Field         | Value                          |
//! |--------|---------------|--------------------------------|
//! | 0      | `"RIFF"`      | ASCII                          |
//! | 4      | ChunkSize     | 36 + dataBytes                 |
//! | 8      | `"WAVE"`      | ASCII                          |
//! | 12     | `"fmt "`      | ASCII                          |
//! | 16     | Subchunk1Size | 16                             |
//! | 20     | AudioFormat   | 1 (PCM)                        |
//! | 22     | NumChannels   | 1                              |
//! | 24     | SampleRate    | 16000                          |
//! | 28     | ByteRate      | SampleRate × NumChannels × 2   |
//! | 32     | BlockAlign    | 2                              |
//! | 34     | BitsPerSample | 16                             |
//! | 36     | `"data"`      | ASCII                          |
//! | 40     | Subchunk2Size | sampleCount × 2                |
//! | 44..   | samples       | int16                          |

/// Rate written into every encoded header.
pub const WAV_SAMPLE_RATE: u32 = 16_000;
/// Size of the canonical header in bytes.
pub const WAV_HEADER_LEN: usize = 44;
/// MIME type attached to the multipart upload.
pub const WAV_MIME: &str = "audio/wav";

const NUM_CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BLOCK_ALIGN: u16 = NUM_CHANNELS * BITS_PER_SAMPLE / 8;
const BYTE_RATE: u32 = WAV_SAMPLE_RATE * NUM_CHANNELS as u32 * 2;

// ---------------------------------------------------------------------------
// WavAudio
// ---------------------------------------------------------------------------

/// An encoded, self-describing WAV byte stream ready for upload.
///
/// Only [`encode_wav`] constructs this type, so the header always matches the
/// table above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavAudio {
    bytes: Vec<u8>,
}

impl WavAudio {
    /// Raw bytes (header + PCM).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Total length in bytes, header included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// `true` when the stream holds no samples (header only).
    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// Number of 16-bit samples after the header.
    pub fn sample_count(&self) -> usize {
        (self.bytes.len() - WAV_HEADER_LEN) / 2
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.sample_count() as f32 / WAV_SAMPLE_RATE as f32
    }
}

// ---------------------------------------------------------------------------
// encode_wav
// ---------------------------------------------------------------------------

/// Serialize 16 kHz mono `f32` samples into a canonical WAV stream.
///
/// Each sample is clamped to `[-1.0, 1.0]` and scaled asymmetrically:
/// negative values by 32768, non-negative by 32767, truncated toward zero.
/// `NaN` encodes as 0.
///
/// ```rust
/// use nihao_voice::audio::encode_wav;
///
/// let wav = encode_wav(&[0.0, 1.0, -1.0]);
/// assert_eq!(wav.len(), 44 + 3 * 2);
/// assert_eq!(&wav.as_bytes()[0..4], b"RIFF");
/// ```
pub fn encode_wav(samples: &[f32]) -> WavAudio {
    let data_bytes = samples.len() * 2;
    let mut bytes = Vec::with_capacity(WAV_HEADER_LEN + data_bytes);

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_bytes as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&NUM_CHANNELS.to_le_bytes());
    bytes.extend_from_slice(&WAV_SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&BYTE_RATE.to_le_bytes());
    bytes.extend_from_slice(&BLOCK_ALIGN.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(data_bytes as u32).to_le_bytes());

    for &sample in samples {
        bytes.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }

    WavAudio { bytes }
}

/// Convert one float sample to int16 with the backend's asymmetric scaling.
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32_768.0 } else { s * 32_767.0 };
    // `as` truncates toward zero and maps NaN to 0.
    scaled as i16
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
