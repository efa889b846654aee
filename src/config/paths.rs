//! Cross-platform application paths using the `dirs` crate.
//!
//! Config dir:
//!   Windows: %APPDATA%\nihao-voice\
//!   macOS:   ~/Library/Application Support/nihao-voice/
//!   Linux:   ~/.config/nihao-voice/
//!
//! Cache dir (playback files for recorded takes):
//!   Windows: %LOCALAPPDATA%\nihao-voice\takes\
//!   macOS:   ~/Library/Caches/nihao-voice/takes/
//!   Linux:   ~/.cache/nihao-voice/takes/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory where playback copies of recorded takes are written.
    pub takes_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "nihao-voice";

    /// Resolves all paths using the `dirs` crate, falling back to the
    /// current directory if the platform cannot provide a standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let takes_dir = cache_dir.join("takes");

        Self {
            config_dir,
            settings_file,
            takes_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
