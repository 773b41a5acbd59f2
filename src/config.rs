use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::library::JsonRoutineStore;
use crate::playback::{PlaybackConfig, ReminderPolicy};

/// Persistent player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub tick_interval_ms: u64,
    pub cue_every_secs: u64,
    pub preview_chars: usize,
    pub reminders_enabled: bool,
    pub reminder_policy: ReminderPolicy,
    /// Ring the terminal bell on countdown cues as well as step completion
    pub bell_on_tick: bool,
    /// Routine library file; defaults to the user's data directory
    pub library_path: Option<PathBuf>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        let playback = PlaybackConfig::default();
        Self {
            tick_interval_ms: playback.tick_interval.as_millis() as u64,
            cue_every_secs: playback.cue_every_secs,
            preview_chars: playback.preview_chars,
            reminders_enabled: true,
            reminder_policy: playback.reminder_policy,
            bell_on_tick: false,
            library_path: None,
        }
    }
}

impl PlayerSettings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stepwise").join("settings.json"))
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from `path`; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), "Could not read settings: {}", e);
                return Self::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), "Ignoring malformed settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            // 10ms floor
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(10)),
            cue_every_secs: self.cue_every_secs,
            preview_chars: self.preview_chars,
            reminder_policy: self.reminder_policy,
        }
    }

    pub fn library_path(&self) -> Option<PathBuf> {
        self.library_path.clone().or_else(JsonRoutineStore::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_playback() {
        let settings = PlayerSettings::default();
        let config = settings.playback_config();
        assert_eq!(config.tick_interval, Duration::from_millis(500));
        assert_eq!(config.cue_every_secs, 5);
        assert_eq!(config.preview_chars, 120);
        assert_eq!(config.reminder_policy, ReminderPolicy::Always);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), r#"{"cue_every_secs": 10, "reminder_policy": "while_playing"}"#).unwrap();

        let settings = PlayerSettings::load_from(file.path());
        assert_eq!(settings.cue_every_secs, 10);
        assert_eq!(settings.reminder_policy, ReminderPolicy::WhilePlaying);
        assert_eq!(settings.tick_interval_ms, 500);
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "[1, 2").unwrap();
        assert_eq!(PlayerSettings::load_from(file.path()), PlayerSettings::default());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepwise").join("settings.json");
        let settings = PlayerSettings {
            tick_interval_ms: 250,
            library_path: Some(PathBuf::from("/tmp/lib.json")),
            ..PlayerSettings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(PlayerSettings::load_from(&path), settings);
    }

    #[test]
    fn test_tiny_tick_interval_is_clamped() {
        let settings = PlayerSettings {
            tick_interval_ms: 0,
            ..PlayerSettings::default()
        };
        assert_eq!(settings.playback_config().tick_interval, Duration::from_millis(10));
    }
}
