//! Local playback handles for recorded takes.
//!
//! A [`PlaybackUrl`] writes the take's container to a temporary file and
//! exposes it as a `file://` URL that any local player can open.  Revoking
//! the handle deletes the file; it is idempotent, never fails from the
//! caller's point of view, and also happens on drop.

use std::io::Write;
use std::path::{Path, PathBuf};

use reqwest::Url;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::audio::session::RecordedTake;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to write playback file: {0}")]
    Io(#[from] std::io::Error),

    #[error("playback path cannot be expressed as a URL: {0}")]
    InvalidPath(PathBuf),
}

/// A revocable `file://` URL pointing at a copy of one take.
#[derive(Debug)]
pub struct PlaybackUrl {
    file: Option<NamedTempFile>,
    url: Url,
}

impl PlaybackUrl {
    /// Write `take` into a new temporary file under `dir`.
    pub fn create(take: &RecordedTake, dir: &Path) -> Result<Self, PlaybackError> {
        std::fs::create_dir_all(dir)?;
        let dir = std::fs::canonicalize(dir)?;

        let mut file = tempfile::Builder::new()
            .prefix("take-")
            .suffix(extension_for(take.mime()))
            .tempfile_in(&dir)?;
        file.write_all(take.bytes())?;
        file.flush()?;

        let url = Url::from_file_path(file.path())
            .map_err(|()| PlaybackError::InvalidPath(file.path().to_path_buf()))?;

        log::debug!("playback url created: {url}");
        Ok(Self {
            file: Some(file),
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Backing file, or `None` once revoked.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(NamedTempFile::path)
    }

    pub fn is_revoked(&self) -> bool {
        self.file.is_none()
    }

    /// Delete the backing file.  Failures are logged, not returned.
    pub fn revoke(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        if let Err(e) = file.close() {
            log::warn!("failed to remove playback file for {}: {e}", self.url);
        } else {
            log::debug!("playback url revoked: {}", self.url);
        }
    }
}

impl Drop for PlaybackUrl {
    fn drop(&mut self) {
        self.revoke();
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "audio/wav" | "audio/wave" | "audio/x-wav" => ".wav",
        "audio/webm" => ".webm",
        "audio/ogg" => ".ogg",
        "audio/flac" => ".flac",
        "audio/mpeg" => ".mp3",
        _ => ".bin",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn take() -> RecordedTake {
        RecordedTake::from_container(b"RIFF....WAVE".to_vec(), "audio/wav")
    }

    #[test]
    fn create_writes_take_and_exposes_file_url() {
        let dir = tempdir().unwrap();
        let playback = PlaybackUrl::create(&take(), dir.path()).unwrap();

        assert_eq!(playback.url().scheme(), "file");
        let path = playback.path().unwrap().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF....WAVE");
        assert_eq!(path.extension().unwrap(), "wav");
        assert_eq!(playback.url().to_file_path().unwrap(), path);
    }

    #[test]
    fn revoke_deletes_file_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut playback = PlaybackUrl::create(&take(), dir.path()).unwrap();
        let path = playback.path().unwrap().to_path_buf();

        playback.revoke();
        assert!(playback.is_revoked());
        assert!(!path.exists());

        playback.revoke();
        assert!(playback.path().is_none());
    }

    #[test]
    fn drop_revokes() {
        let dir = tempdir().unwrap();
        let playback = PlaybackUrl::create(&take(), dir.path()).unwrap();
        let path = playback.path().unwrap().to_path_buf();
        drop(playback);
        assert!(!path.exists());
    }

    #[test]
    fn revoke_survives_file_removed_underneath() {
        let dir = tempdir().unwrap();
        let mut playback = PlaybackUrl::create(&take(), dir.path()).unwrap();
        std::fs::remove_file(playback.path().unwrap()).unwrap();
        playback.revoke();
        assert!(playback.is_revoked());
    }
}
