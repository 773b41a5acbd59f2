use std::path::Path;
use tracing::{debug, info};

use crate::core::AssetRef;
use crate::error::MediaError;

/// Video container extensions the terminal player accepts
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "webm"];

/// A prepared, playable media asset
pub trait MediaPlayer: Send {
    /// Asset this player was prepared for
    fn asset(&self) -> &AssetRef;

    fn play(&mut self);

    fn pause(&mut self);

    fn is_playing(&self) -> bool;
}

/// Trait for turning step assets into players
///
/// Preparation failures are never fatal to playback: the engine simply
/// shows the step without media.
pub trait MediaPreparer: Send + Sync {
    /// Build a player for `asset`
    fn prepare(&self, asset: &AssetRef) -> Result<Box<dyn MediaPlayer>, MediaError>;

    /// Best-effort warm-up; must not block or fail
    fn preload(&self, asset: &AssetRef);
}

/// Media preparer for local files and remote URLs
///
/// Remote URLs are accepted as-is; local paths must exist and carry a
/// known video extension.
#[derive(Debug, Clone, Default)]
pub struct FileMediaPreparer;

impl FileMediaPreparer {
    pub fn new() -> Self {
        Self
    }

    fn check_local(path: &Path) -> Result<(), MediaError> {
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !supported {
            return Err(MediaError::Unsupported(path.display().to_string()));
        }
        if !path.exists() {
            return Err(MediaError::NotFound(path.display().to_string()));
        }
        Ok(())
    }
}

impl MediaPreparer for FileMediaPreparer {
    fn prepare(&self, asset: &AssetRef) -> Result<Box<dyn MediaPlayer>, MediaError> {
        if !asset.is_url() {
            Self::check_local(Path::new(asset.as_str()))?;
        }
        Ok(Box::new(LoggedPlayer::new(asset.clone())))
    }

    fn preload(&self, asset: &AssetRef) {
        if asset.is_url() {
            debug!(asset = %asset, "Skipping preload of remote asset");
            return;
        }
        // Warm the file metadata off the caller's path when a runtime is available
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let path = asset.as_str().to_string();
            handle.spawn(async move {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) => debug!(path = %path, bytes = meta.len(), "Preloaded media"),
                    Err(e) => debug!(path = %path, "Preload failed: {}", e),
                }
            });
        }
    }
}

/// Player that reports play/pause through the log
///
/// The terminal front end has no video surface, so this only tracks state.
#[derive(Debug)]
pub struct LoggedPlayer {
    asset: AssetRef,
    playing: bool,
}

impl LoggedPlayer {
    pub fn new(asset: AssetRef) -> Self {
        Self {
            asset,
            playing: false,
        }
    }
}

impl MediaPlayer for LoggedPlayer {
    fn asset(&self) -> &AssetRef {
        &self.asset
    }

    fn play(&mut self) {
        if !self.playing {
            info!(asset = %self.asset, "Media playing");
            self.playing = true;
        }
    }

    fn pause(&mut self) {
        if self.playing {
            info!(asset = %self.asset, "Media paused");
            self.playing = false;
        }
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_asset_prepares() {
        let preparer = FileMediaPreparer::new();
        let mut player = preparer
            .prepare(&AssetRef::new("https://cdn.example.com/warmup.mp4"))
            .unwrap();
        assert!(!player.is_playing());
        player.play();
        assert!(player.is_playing());
        player.pause();
        assert!(!player.is_playing());
    }

    #[test]
    fn test_missing_local_file() {
        let preparer = FileMediaPreparer::new();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing-video.mp4");
        let result = preparer.prepare(&AssetRef::new(missing.to_string_lossy()));
        assert!(matches!(result, Err(MediaError::NotFound(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let preparer = FileMediaPreparer::new();
        let result = preparer.prepare(&AssetRef::new("/tmp/notes.txt"));
        assert!(matches!(result, Err(MediaError::Unsupported(_))));
    }

    #[test]
    fn test_existing_local_file() {
        let file = tempfile::Builder::new().suffix(".MP4").tempfile().unwrap();
        std::fs::write(file.path(), b"not really a video").unwrap();

        let preparer = FileMediaPreparer::new();
        let path = file.path().to_string_lossy();
        let player = preparer.prepare(&AssetRef::new(path.clone())).unwrap();
        assert_eq!(player.asset().as_str(), path);
    }

    #[test]
    fn test_preload_without_runtime_is_noop() {
        FileMediaPreparer::new().preload(&AssetRef::new("/tmp/whatever.mp4"));
    }
}
