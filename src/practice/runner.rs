//! Practice session: drives one scenario attempt from microphone to score.
//!
//! # Flow
//!
//! ```text
//! start_recording(recorder)      revoke stale playback, open device   [Recording]
//! stop_recording()               release device, finalize take        [Stopped]
//! playback_url()                 lazily write take to a temp file
//! submit().await
//!   └─▶ spawn_blocking(transcode)  (once; cached for retries)          [Transcoding]
//!         ├─ Err → drop take, must re-record                          [Error]
//!         └─ Ok  → ScoringClient::submit_attempt                      [Submitting]
//!                    ├─ Ok  → result stored                            [Scored]
//!                    └─ Err → take + WAV kept, submit() may be retried [Error]
//! discard()                      revoke playback, release device      [Idle]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Url;
use thiserror::Error;

use crate::audio::{
    ActiveRecording, CaptureError, PlaybackError, PlaybackUrl, RecordedTake, Recorder,
    TranscodeError, Transcoder, WavAudio,
};
use crate::scoring::{AttemptResult, ScoringClient, UploadError};

use super::state::PracticeState;

// ---------------------------------------------------------------------------
// PracticeError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PracticeError {
    /// Another record or submit action is in progress.
    #[error("busy ({})", .0.label())]
    Busy(PracticeState),

    #[error("no recording in progress")]
    NotRecording,

    #[error("nothing recorded yet")]
    NoTake,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Background task failure (e.g. the transcode task panicked).
    #[error("internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// PracticeSession
// ---------------------------------------------------------------------------

/// One learner working through one scenario of a lesson session.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use nihao_voice::audio::{CaptureConstraints, Recorder, Transcoder};
/// use nihao_voice::config::{AppConfig, AppPaths};
/// use nihao_voice::practice::PracticeSession;
/// use nihao_voice::scoring::ApiScoringClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::default();
/// let client = Arc::new(ApiScoringClient::from_config(&config.api));
/// let mut practice = PracticeSession::new(
///     client,
///     Transcoder::from_config(&config.transcode),
///     AppPaths::new().takes_dir,
///     "session-id",
///     "scenario-id",
/// );
///
/// let recorder = Recorder::new(CaptureConstraints::from(&config.capture))?;
/// practice.start_recording(&recorder)?;
/// // ... learner speaks ...
/// practice.stop_recording()?;
/// let result = practice.submit().await?;
/// println!("total: {}", result.scores.total);
/// # Ok(())
/// # }
/// ```
pub struct PracticeSession {
    client: Arc<dyn ScoringClient>,
    transcoder: Transcoder,
    takes_dir: PathBuf,
    session_id: String,
    scenario_id: String,
    state: PracticeState,
    recording: Option<ActiveRecording>,
    take: Option<RecordedTake>,
    /// Encoded payload for `take`, kept so a failed upload can be retried.
    wav: Option<WavAudio>,
    playback: Option<PlaybackUrl>,
    result: Option<AttemptResult>,
    last_error: Option<String>,
}

impl PracticeSession {
    pub fn new(
        client: Arc<dyn ScoringClient>,
        transcoder: Transcoder,
        takes_dir: impl Into<PathBuf>,
        session_id: impl Into<String>,
        scenario_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            transcoder,
            takes_dir: takes_dir.into(),
            session_id: session_id.into(),
            scenario_id: scenario_id.into(),
            state: PracticeState::Idle,
            recording: None,
            take: None,
            wav: None,
            playback: None,
            result: None,
            last_error: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> PracticeState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    pub fn take(&self) -> Option<&RecordedTake> {
        self.take.as_ref()
    }

    /// Encoded WAV for the current take, once `submit` has produced it.
    pub fn encoded(&self) -> Option<&WavAudio> {
        self.wav.as_ref()
    }

    pub fn result(&self) -> Option<&AttemptResult> {
        self.result.as_ref()
    }

    /// User-facing message for the most recent failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Open the microphone and begin a new take.
    ///
    /// Any previous take and its playback URL are dropped first.
    pub fn start_recording(&mut self, recorder: &Recorder) -> Result<(), PracticeError> {
        if self.state.is_busy() {
            return Err(PracticeError::Busy(self.state));
        }
        self.clear_take();
        self.result = None;

        match recorder.start() {
            Ok(recording) => {
                self.recording = Some(recording);
                self.last_error = None;
                self.state = PracticeState::Recording;
                log::info!("practice: recording scenario {}", self.scenario_id);
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Forward chunks captured so far; returns elapsed seconds.
    pub fn pump(&mut self) -> Result<f32, PracticeError> {
        let recording = self.recording.as_mut().ok_or(PracticeError::NotRecording)?;
        recording.pump()?;
        Ok(recording.elapsed_secs())
    }

    /// Release the device and keep the finalized take.
    pub fn stop_recording(&mut self) -> Result<&RecordedTake, PracticeError> {
        let recording = self.recording.take().ok_or(PracticeError::NotRecording)?;
        self.state = PracticeState::Idle;
        match recording.stop() {
            Ok(take) => self.accept_take(take),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Install an already-finalized take, e.g. one loaded from disk.
    pub fn accept_take(&mut self, take: RecordedTake) -> Result<&RecordedTake, PracticeError> {
        if self.state.is_busy() {
            return Err(PracticeError::Busy(self.state));
        }
        self.clear_take();
        self.result = None;
        self.last_error = None;
        self.state = PracticeState::Stopped;
        Ok(self.take.insert(take))
    }

    /// Local `file://` URL for listening back to the current take.
    ///
    /// Created on first call and reused until the take changes.
    pub fn playback_url(&mut self) -> Result<&Url, PracticeError> {
        if self.playback.is_none() {
            let take = self.take.as_ref().ok_or(PracticeError::NoTake)?;
            self.playback = Some(PlaybackUrl::create(take, &self.takes_dir)?);
        }
        match &self.playback {
            Some(playback) => Ok(playback.url()),
            None => Err(PracticeError::NoTake),
        }
    }

    /// Throw away the take (or the recording in progress).  Never fails.
    pub fn discard(&mut self) {
        if let Some(recording) = self.recording.take() {
            recording.discard();
        }
        self.clear_take();
        self.result = None;
        self.last_error = None;
        self.state = PracticeState::Idle;
    }

    /// Move on to another scenario of the same session.
    pub fn advance_to(&mut self, scenario_id: impl Into<String>) {
        self.discard();
        self.scenario_id = scenario_id.into();
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Transcode the take (first time only) and upload it for scoring.
    ///
    /// A take that cannot be decoded is dropped.  An upload failure keeps the
    /// take and its WAV so this can simply be called again.  Dropping the
    /// returned future (e.g. under `tokio::time::timeout`) puts the session
    /// back in the state it had before the call; a WAV that finished encoding
    /// stays cached.
    pub async fn submit(&mut self) -> Result<AttemptResult, PracticeError> {
        if self.state.is_busy() {
            return Err(PracticeError::Busy(self.state));
        }

        if self.wav.is_none() {
            let take = self.take.clone().ok_or(PracticeError::NoTake)?;
            let transcoder = self.transcoder;
            let joined = {
                let _busy = BusyGuard::enter(&mut self.state, PracticeState::Transcoding);
                tokio::task::spawn_blocking(move || transcoder.transcode(&take)).await
            };
            match joined {
                Ok(Ok(wav)) => {
                    log::debug!(
                        "practice: transcoded take to {} bytes ({:.2}s)",
                        wav.len(),
                        wav.duration_secs()
                    );
                    self.wav = Some(wav);
                }
                Ok(Err(e)) => {
                    self.clear_take();
                    return Err(self.fail(e.into()));
                }
                Err(e) => return Err(self.fail(PracticeError::Internal(e.to_string()))),
            }
        }

        let Some(wav) = self.wav.as_ref() else {
            return Err(PracticeError::NoTake);
        };
        let outcome = {
            let _busy = BusyGuard::enter(&mut self.state, PracticeState::Submitting);
            self.client
                .submit_attempt(&self.session_id, &self.scenario_id, wav)
                .await
        };

        match outcome {
            Ok(result) => {
                self.state = PracticeState::Scored;
                self.last_error = None;
                self.result = Some(result.clone());
                Ok(result)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn clear_take(&mut self) {
        if let Some(mut playback) = self.playback.take() {
            playback.revoke();
        }
        self.take = None;
        self.wav = None;
    }

    fn fail(&mut self, err: PracticeError) -> PracticeError {
        log::warn!("practice: {err}");
        self.state = PracticeState::Error;
        self.last_error = Some(err.to_string());
        err
    }
}

// ---------------------------------------------------------------------------
// BusyGuard
// ---------------------------------------------------------------------------

/// Holds a busy state for the length of one `.await` and puts the previous
/// state back when dropped, whether the await completed or was cancelled.
struct BusyGuard<'a> {
    slot: &'a mut PracticeState,
    previous: PracticeState,
}

impl<'a> BusyGuard<'a> {
    fn enter(slot: &'a mut PracticeState, busy: PracticeState) -> Self {
        let previous = std::mem::replace(slot, busy);
        Self { slot, previous }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        *self.slot = self.previous;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::audio::{AudioChunk, RecordingSession};
    use crate::scoring::AttemptScores;

    type Call = (String, String, usize);

    /// Replays scripted replies and records what it was sent.
    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<AttemptResult, UploadError>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedClient {
        fn with(replies: Vec<Result<AttemptResult, UploadError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScoringClient for ScriptedClient {
        async fn submit_attempt(
            &self,
            session_id: &str,
            scenario_id: &str,
            wav: &WavAudio,
        ) -> Result<AttemptResult, UploadError> {
            self.calls.lock().unwrap().push((
                session_id.to_string(),
                scenario_id.to_string(),
                wav.len(),
            ));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(UploadError::Network("no scripted reply".into())))
        }
    }

    fn scored(total: f64) -> AttemptResult {
        AttemptResult {
            scores: AttemptScores {
                pronunciation: total,
                accuracy: total,
                fluency: total,
                completeness: total,
                total,
            },
            transcription: None,
            feedback: None,
            show_text_feedback: None,
            is_last_scenario: None,
            overall_feedback: None,
        }
    }

    /// Two seconds of mono 48 kHz audio.
    fn two_second_take() -> RecordedTake {
        let mut session = RecordingSession::new();
        session.start(48_000, 1, None);
        for _ in 0..4 {
            session
                .push_chunk(AudioChunk {
                    samples: vec![0.25; 24_000],
                    sample_rate: 48_000,
                    channels: 1,
                })
                .unwrap();
        }
        session.finalize().unwrap()
    }

    fn practice(client: Arc<ScriptedClient>, dir: &std::path::Path) -> PracticeSession {
        PracticeSession::new(client, Transcoder::default(), dir, "sess-1", "scn-1")
    }

    #[tokio::test]
    async fn submit_scores_take() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::with(vec![Ok(scored(88.0))]);
        let mut p = practice(client.clone(), dir.path());

        p.accept_take(two_second_take()).unwrap();
        assert_eq!(p.state(), PracticeState::Stopped);

        let result = p.submit().await.unwrap();
        assert_eq!(result.scores.total, 88.0);
        assert_eq!(p.state(), PracticeState::Scored);
        assert_eq!(p.result().unwrap().scores.total, 88.0);
        assert_eq!(
            client.calls(),
            vec![("sess-1".to_string(), "scn-1".to_string(), 64_044)]
        );
    }

    #[tokio::test]
    async fn upload_failure_keeps_take_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::with(vec![
            Err(UploadError::Server {
                status: 400,
                message: "Recording too quiet".into(),
            }),
            Ok(scored(70.0)),
        ]);
        let mut p = practice(client.clone(), dir.path());
        p.accept_take(two_second_take()).unwrap();

        let err = p.submit().await.unwrap_err();
        assert_eq!(err.to_string(), "Recording too quiet");
        assert_eq!(p.state(), PracticeState::Error);
        assert_eq!(p.last_error(), Some("Recording too quiet"));
        assert!(p.take().is_some());
        assert!(p.encoded().is_some());

        let result = p.submit().await.unwrap();
        assert_eq!(result.scores.total, 70.0);
        assert!(p.last_error().is_none());
        assert_eq!(client.calls().len(), 2);
    }

    /// Hangs on the first upload, scores every later one.
    #[derive(Default)]
    struct HangsOnceClient {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ScoringClient for HangsOnceClient {
        async fn submit_attempt(
            &self,
            _session_id: &str,
            _scenario_id: &str,
            wav: &WavAudio,
        ) -> Result<AttemptResult, UploadError> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(wav.len());
                calls.len() == 1
            };
            if first {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
            Ok(scored(75.0))
        }
    }

    #[tokio::test]
    async fn cancelled_upload_can_be_retried_with_cached_wav() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(HangsOnceClient::default());
        let mut p = PracticeSession::new(
            client.clone(),
            Transcoder::default(),
            dir.path(),
            "sess-1",
            "scn-1",
        );
        p.accept_take(two_second_take()).unwrap();

        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(500), p.submit()).await;
        assert!(timed_out.is_err());

        assert_eq!(p.state(), PracticeState::Stopped);
        assert!(p.take().is_some());
        assert!(p.encoded().is_some());

        let result = p.submit().await.unwrap();
        assert_eq!(result.scores.total, 75.0);
        assert_eq!(p.state(), PracticeState::Scored);
        assert_eq!(*client.calls.lock().unwrap(), vec![64_044, 64_044]);
    }

    #[test]
    fn busy_guard_restores_previous_state() {
        let mut state = PracticeState::Error;
        {
            let _busy = BusyGuard::enter(&mut state, PracticeState::Submitting);
        }
        assert_eq!(state, PracticeState::Error);
    }

    #[tokio::test]
    async fn undecodable_take_is_dropped_without_upload() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::with(vec![Ok(scored(1.0))]);
        let mut p = practice(client.clone(), dir.path());
        p.accept_take(RecordedTake::from_container(
            b"this is not audio at all".to_vec(),
            "audio/wav",
        ))
        .unwrap();

        let err = p.submit().await.unwrap_err();
        assert!(matches!(err, PracticeError::Transcode(_)), "{err}");
        assert_eq!(p.state(), PracticeState::Error);
        assert!(p.take().is_none());
        assert!(client.calls().is_empty());

        assert!(matches!(p.submit().await, Err(PracticeError::NoTake)));
    }

    #[tokio::test]
    async fn submit_without_take_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = practice(ScriptedClient::with(vec![]), dir.path());
        assert!(matches!(p.submit().await, Err(PracticeError::NoTake)));
        assert_eq!(p.state(), PracticeState::Idle);
    }

    #[test]
    fn playback_url_is_reused_and_revoked_on_discard() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = practice(ScriptedClient::with(vec![]), dir.path());
        p.accept_take(two_second_take()).unwrap();

        let first = p.playback_url().unwrap().clone();
        let second = p.playback_url().unwrap().clone();
        assert_eq!(first, second);

        let path = first.to_file_path().unwrap();
        assert!(path.exists());

        p.discard();
        assert!(!path.exists());
        assert!(p.take().is_none());
        assert_eq!(p.state(), PracticeState::Idle);
    }

    #[test]
    fn discard_without_playback_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = practice(ScriptedClient::with(vec![]), dir.path());
        p.discard();
        p.accept_take(two_second_take()).unwrap();
        p.discard();
        p.discard();
        assert_eq!(p.state(), PracticeState::Idle);
    }

    #[test]
    fn new_take_revokes_stale_playback() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = practice(ScriptedClient::with(vec![]), dir.path());
        p.accept_take(two_second_take()).unwrap();
        let stale = p.playback_url().unwrap().to_file_path().unwrap();

        p.accept_take(two_second_take()).unwrap();
        assert!(!stale.exists());

        let fresh = p.playback_url().unwrap().to_file_path().unwrap();
        assert_ne!(stale, fresh);
        assert!(fresh.exists());
    }

    #[test]
    fn playback_url_needs_a_take() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = practice(ScriptedClient::with(vec![]), dir.path());
        assert!(matches!(p.playback_url(), Err(PracticeError::NoTake)));
    }

    #[test]
    fn stop_and_pump_need_a_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = practice(ScriptedClient::with(vec![]), dir.path());
        assert!(matches!(p.pump(), Err(PracticeError::NotRecording)));
        assert!(matches!(
            p.stop_recording(),
            Err(PracticeError::NotRecording)
        ));
    }

    #[tokio::test]
    async fn advance_clears_result_and_switches_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::with(vec![Ok(scored(90.0)), Ok(scored(60.0))]);
        let mut p = practice(client.clone(), dir.path());

        p.accept_take(two_second_take()).unwrap();
        p.submit().await.unwrap();

        p.advance_to("scn-2");
        assert!(p.result().is_none());
        assert_eq!(p.scenario_id(), "scn-2");

        p.accept_take(two_second_take()).unwrap();
        p.submit().await.unwrap();
        assert_eq!(client.calls()[1].1, "scn-2");
    }
}
