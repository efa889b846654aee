//! Submission of recorded takes to the remote scoring service.
//!
//! * [`ScoringClient`]: async trait implemented by every submitter.
//! * [`ApiScoringClient`]: multipart REST implementation.
//! * [`AttemptResult`] / [`AttemptScores`] / [`AttemptFeedback`]: the reply.
//! * [`UploadError`]: the single normalized failure type.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use nihao_voice::audio::encode_wav;
//! use nihao_voice::config::AppConfig;
//! use nihao_voice::scoring::{ApiScoringClient, ScoringClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default().with_env_overrides();
//!     let client = ApiScoringClient::from_config(&config.api);
//!
//!     let wav = encode_wav(&vec![0.0; 16_000]);
//!     match client.submit_attempt("session-id", "scenario-id", &wav).await {
//!         Ok(result) => println!("total: {}", result.scores.total),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

pub mod client;
pub mod response;

pub use client::{
    interpret_response, ApiScoringClient, ScoringClient, UploadError, FALLBACK_MESSAGE,
    UPLOAD_FILE_NAME,
};
pub use response::{AttemptFeedback, AttemptResult, AttemptScores};
