//! Command-line entry point: `nihao-voice`.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (default on first run), then apply
//!    environment and flag overrides.
//! 3. Wire the auth bus so the scoring client always sees the current token.
//! 4. Run the requested subcommand:
//!    * `record`    capture a take, optionally keep it, submit it
//!    * `transcode` convert any supported audio file to the upload WAV
//!    * `submit`    transcode and submit an existing audio file

use std::io::{BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;

use nihao_voice::{
    audio::{CaptureConstraints, RecordedTake, Recorder, Transcoder},
    auth::{AuthBus, AuthEvent, AuthSession},
    config::{AppConfig, AppPaths, ResampleMode},
    practice::PracticeSession,
    scoring::{ApiScoringClient, AttemptResult},
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "nihao-voice", about = "Record and score Ni Hao Now attempts", version)]
struct Cli {
    /// Scoring API base URL (overrides settings and NIHAO_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token (overrides settings and NIHAO_API_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Resampling method used when converting to 16 kHz
    #[arg(long, value_enum, global = true)]
    resample: Option<ResampleMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record from the microphone and submit the take
    Record {
        #[arg(long)]
        session: String,
        #[arg(long)]
        scenario: String,
        /// Stop after this many seconds instead of waiting for Enter
        #[arg(long)]
        seconds: Option<f32>,
        /// Also write the recorded container to this path
        #[arg(long)]
        keep: Option<PathBuf>,
        /// Record and transcode only; skip the upload
        #[arg(long, default_value_t = false)]
        no_submit: bool,
    },

    /// Convert an audio file to 16 kHz mono 16-bit WAV
    Transcode { input: PathBuf, output: PathBuf },

    /// Transcode an audio file and submit it as an attempt
    Submit {
        #[arg(long)]
        session: String,
        #[arg(long)]
        scenario: String,
        input: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = AppConfig::load()
        .unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        })
        .with_env_overrides();
    if let Some(url) = &cli.base_url {
        config.api.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(mode) = cli.resample {
        config.transcode.resample_mode = mode;
    }

    let bus = AuthBus::default();
    let auth = AuthSession::new(config.api.token.clone());
    tokio::spawn(bus.subscribe().run(auth.clone()));
    if let Some(token) = cli.token.clone() {
        let event = AuthEvent::LoggedIn { token };
        // Applied here so the first request sees it; the listener's copy is a no-op.
        auth.apply(&event);
        bus.publish(event);
    }

    let client = Arc::new(ApiScoringClient::with_auth(&config.api, auth.clone()));
    let transcoder = Transcoder::from_config(&config.transcode);
    let takes_dir = AppPaths::new().takes_dir;

    match cli.command {
        Command::Record {
            session,
            scenario,
            seconds,
            keep,
            no_submit,
        } => {
            let recorder = Recorder::new(CaptureConstraints::from(&config.capture))?;
            let mut practice = PracticeSession::new(client, transcoder, takes_dir, session, scenario);

            record_take(&mut practice, &recorder, seconds).await?;
            if let Some(take) = practice.take() {
                log::info!("captured {:.2}s", take.duration_secs());
                if let Some(path) = keep {
                    write_file(&path, take.bytes())?;
                    println!("take saved to {}", path.display());
                }
            }
            if let Ok(url) = practice.playback_url() {
                println!("listen back: {url}");
                if std::io::stdin().is_terminal() {
                    println!("press Enter to continue (the playback file is removed on exit)");
                    tokio::task::spawn_blocking(|| read_enter(std::io::stdin().lock()))
                        .await
                        .context("stdin reader failed")??;
                }
            }

            if no_submit {
                let wav = transcoder.transcode(practice.take().context("no take recorded")?)?;
                println!("transcoded to {} bytes ({:.2}s)", wav.len(), wav.duration_secs());
            } else {
                submit(&mut practice, &auth).await?;
            }
            practice.discard();
        }

        Command::Transcode { input, output } => {
            let bytes = read_file(&input)?;
            let wav = transcoder.transcode_bytes(&bytes, Some(mime_for(&input)))?;
            write_file(&output, wav.as_bytes())?;
            println!(
                "{} → {} ({} samples, {:.2}s)",
                input.display(),
                output.display(),
                wav.sample_count(),
                wav.duration_secs()
            );
        }

        Command::Submit {
            session,
            scenario,
            input,
        } => {
            let bytes = read_file(&input)?;
            let mut practice = PracticeSession::new(client, transcoder, takes_dir, session, scenario);
            practice.accept_take(RecordedTake::from_container(bytes, mime_for(&input)))?;
            submit(&mut practice, &auth).await?;
            practice.discard();
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Record until Enter is pressed, `seconds` elapse, or the configured
/// maximum length is reached.
async fn record_take(
    practice: &mut PracticeSession,
    recorder: &Recorder,
    seconds: Option<f32>,
) -> Result<()> {
    let limit = seconds.or(recorder.constraints().max_recording_secs);

    practice.start_recording(recorder)?;
    match seconds {
        Some(s) => println!("recording for {s:.1}s…"),
        None => println!("recording… press Enter to stop"),
    }

    // A detached thread so a pending stdin read never holds up shutdown.
    // Only started when Enter ends the take, so later prompts own stdin.
    let (enter_tx, mut enter_rx) = oneshot::channel();
    if seconds.is_none() {
        std::thread::spawn(move || {
            let _ = read_enter(std::io::stdin().lock());
            let _ = enter_tx.send(());
        });
    }

    let mut tick = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = &mut enter_rx, if seconds.is_none() => break,
            _ = tick.tick() => {
                let elapsed = practice.pump()?;
                if limit.is_some_and(|l| elapsed >= l) {
                    break;
                }
            }
        }
    }

    practice.stop_recording()?;
    Ok(())
}

async fn submit(practice: &mut PracticeSession, auth: &AuthSession) -> Result<()> {
    if !auth.is_logged_in() {
        log::warn!("no API token configured; the server may reject the attempt");
    }
    let result = practice.submit().await?;
    print_result(&result);
    Ok(())
}

fn print_result(result: &AttemptResult) {
    let s = &result.scores;
    println!("total         {:>6.1}", s.total);
    println!("pronunciation {:>6.1}", s.pronunciation);
    println!("accuracy      {:>6.1}", s.accuracy);
    println!("fluency       {:>6.1}", s.fluency);
    println!("completeness  {:>6.1}", s.completeness);
    if let Some(text) = &result.transcription {
        println!("heard: {text}");
    }
    if let Some(feedback) = result.text_feedback() {
        println!("feedback: {feedback}");
    }
    if result.is_last_scenario() {
        if let Some(overall) = &result.overall_feedback {
            println!("session summary: {overall}");
        }
    }
}

/// Block until a line (or end of input) arrives on `input`.
fn read_enter(mut input: impl BufRead) -> std::io::Result<()> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(())
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg" | "oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("m4a" | "mp4" | "aac") => "audio/mp4",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_enter_returns_after_one_line() {
        let mut input = Cursor::new(b"\nrest".to_vec());
        read_enter(&mut input).unwrap();
        assert_eq!(input.position(), 1);
    }

    #[test]
    fn read_enter_returns_at_end_of_input() {
        read_enter(Cursor::new(Vec::new())).unwrap();
    }

    #[test]
    fn record_flags_parse() {
        let cli = Cli::try_parse_from([
            "nihao-voice",
            "record",
            "--session",
            "s1",
            "--scenario",
            "c1",
            "--seconds",
            "2.5",
            "--no-submit",
            "--resample",
            "sinc",
        ])
        .unwrap();
        assert_eq!(cli.resample, Some(ResampleMode::Sinc));
        match cli.command {
            Command::Record {
                session,
                seconds,
                no_submit,
                keep,
                ..
            } => {
                assert_eq!(session, "s1");
                assert_eq!(seconds, Some(2.5));
                assert!(no_submit);
                assert!(keep.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for(Path::new("a.WAV")), "audio/wav");
        assert_eq!(mime_for(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(mime_for(Path::new("noext")), "application/octet-stream");
    }
}
