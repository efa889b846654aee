//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Environment variable that overrides [`ApiConfig::base_url`].
pub const ENV_BASE_URL: &str = "NIHAO_API_BASE_URL";
/// Environment variable that overrides [`ApiConfig::token`].
pub const ENV_TOKEN: &str = "NIHAO_API_TOKEN";

// ---------------------------------------------------------------------------
// ResampleMode
// ---------------------------------------------------------------------------

/// Interpolation used when converting decoded audio to 16 kHz.
///
/// | Variant  | Method                               | Reference encoding |
/// |----------|--------------------------------------|--------------------|
/// | Nearest  | drop-sample, `floor(i × ratio)`      | Yes                |
/// | Linear   | two-tap linear interpolation         | No                 |
/// | Sinc     | windowed sinc via `rubato`           | No                 |
///
/// Every mode emits exactly `floor(duration × 16000)` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMode {
    Nearest,
    Linear,
    Sinc,
}

impl Default for ResampleMode {
    fn default() -> Self {
        Self::Nearest
    }
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

/// Connection settings for the scoring backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API, without a trailing slash
    /// (e.g. `https://api.nihaonow.app/api`).
    pub base_url: String,
    /// Bearer token. `None` until the user logs in.
    pub token: Option<String>,
    /// Maximum seconds to wait for a submission response.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".into(),
            token: None,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Microphone capture constraints.
///
/// The rate and channel counts are hints: the recorder prefers a device
/// configuration that matches them and falls back to the device default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Preferred capture rate in Hz.
    pub sample_rate_hint: u32,
    /// Preferred channel count.
    pub channels_hint: u16,
    /// Ask the host for echo cancellation.
    pub echo_cancellation: bool,
    /// Ask the host for noise suppression.
    pub noise_suppression: bool,
    /// Input device name; `None` means the system default.
    pub device: Option<String>,
    /// Recording stops accepting audio after this many seconds.
    pub max_recording_secs: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate_hint: 16_000,
            channels_hint: 1,
            echo_cancellation: true,
            noise_suppression: true,
            device: None,
            max_recording_secs: 60.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TranscodeConfig
// ---------------------------------------------------------------------------

/// Settings for the container → WAV conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscodeConfig {
    pub resample_mode: ResampleMode,
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use nihao_voice::config::AppConfig;
///
/// // Load (returns Default when file is missing), then apply env overrides
/// let config = AppConfig::load().unwrap().with_env_overrides();
/// println!("{}", config.api.base_url);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub capture: CaptureConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `NIHAO_API_BASE_URL` / `NIHAO_API_TOKEN` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.api.token = Some(token.trim().to_string());
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
