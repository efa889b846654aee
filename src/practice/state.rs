//! Practice state machine.
//!
//! [`PracticeState`] tracks where one scenario attempt is in the
//! record → transcode → submit cycle.  [`PracticeSession`](super::PracticeSession)
//! owns the value and uses [`is_busy`](PracticeState::is_busy) to serialize
//! record actions.

// ---------------------------------------------------------------------------
// PracticeState
// ---------------------------------------------------------------------------

/// States of one scenario attempt.
///
/// ```text
/// Idle ──start_recording──▶ Recording
///      ──stop_recording───▶ Stopped
///                           ──submit──▶ Transcoding ──▶ Submitting ──▶ Scored
/// Transcoding / Submitting ──error──▶ Error
/// any state ──discard──▶ Idle
/// Stopped / Scored / Error ──start_recording──▶ Recording
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PracticeState {
    /// No take yet.
    #[default]
    Idle,

    /// The microphone is open and chunks are being collected.
    Recording,

    /// A finalized take is held and can be played back or submitted.
    Stopped,

    /// The take is being decoded and resampled to 16 kHz WAV.
    Transcoding,

    /// The WAV payload is being uploaded for scoring.
    Submitting,

    /// The scoring service replied with a result.
    Scored,

    /// The last transcode or upload failed.  See the session's last error.
    Error,
}

impl PracticeState {
    /// Returns `true` while another record or submit action must be refused.
    ///
    /// ```
    /// use nihao_voice::practice::PracticeState;
    ///
    /// assert!(!PracticeState::Idle.is_busy());
    /// assert!(PracticeState::Recording.is_busy());
    /// assert!(PracticeState::Submitting.is_busy());
    /// assert!(!PracticeState::Error.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PracticeState::Recording | PracticeState::Transcoding | PracticeState::Submitting
        )
    }

    /// Short human-readable label for status output.
    pub fn label(&self) -> &'static str {
        match self {
            PracticeState::Idle => "Idle",
            PracticeState::Recording => "Recording",
            PracticeState::Stopped => "Ready",
            PracticeState::Transcoding => "Processing",
            PracticeState::Submitting => "Submitting",
            PracticeState::Scored => "Scored",
            PracticeState::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
