//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the API client,
//! microphone capture and transcoding, `AppPaths` for cross-platform
//! directories, and TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    ApiConfig, AppConfig, CaptureConfig, ResampleMode, TranscodeConfig, ENV_BASE_URL, ENV_TOKEN,
};
