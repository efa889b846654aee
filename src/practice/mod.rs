//! Scenario practice: the record → play back → submit loop for one learner.
//!
//! ```text
//! Recorder (cpal) ──▶ PracticeSession ──▶ Transcoder ──▶ ScoringClient
//!                          │
//!                          └─ PlaybackUrl (temp file, revoked on discard)
//! ```

pub mod runner;
pub mod state;

pub use runner::{PracticeError, PracticeSession};
pub use state::PracticeState;
