//! Persisted playback settings and view preferences.

use std::path::Path;

use crate::storage::{load_toml_document, persist_toml_document};

/// Playback behavior persisted to `playback_settings.toml`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackSettings {
    /// Loudness target the normalizer aims for, in dB.
    #[serde(default = "default_target_loudness_db")]
    pub target_loudness_db: f64,
    /// Cap on boost/attenuation applied by normalization, in dB.
    #[serde(default = "default_max_gain_db")]
    pub max_gain_db: f64,
    /// User volume slider, linear 0.0–2.0.
    #[serde(default = "default_volume_slider")]
    pub volume_slider: f64,
    #[serde(default = "default_no_repeat")]
    pub no_repeat_enabled: bool,
    /// Per-file decode tool timeout for scans.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            target_loudness_db: default_target_loudness_db(),
            max_gain_db: default_max_gain_db(),
            volume_slider: default_volume_slider(),
            no_repeat_enabled: default_no_repeat(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl PlaybackSettings {
    pub fn load(path: &Path) -> Self {
        load_toml_document(path)
    }

    pub fn persist(&self, path: &Path) -> std::io::Result<()> {
        persist_toml_document(self, path)
    }
}

/// Collection-view preferences persisted to `view_preferences.toml`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ViewPreferences {
    #[serde(default = "default_true")]
    pub show_file_names: bool,
    #[serde(default = "default_thumbnail_edge_px")]
    pub thumbnail_edge_px: u32,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

impl Default for ViewPreferences {
    fn default() -> Self {
        Self {
            show_file_names: true,
            thumbnail_edge_px: default_thumbnail_edge_px(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl ViewPreferences {
    pub fn load(path: &Path) -> Self {
        load_toml_document(path)
    }

    pub fn persist(&self, path: &Path) -> std::io::Result<()> {
        persist_toml_document(self, path)
    }
}

fn default_target_loudness_db() -> f64 {
    -18.0
}

fn default_max_gain_db() -> f64 {
    6.0
}

fn default_volume_slider() -> f64 {
    1.0
}

fn default_no_repeat() -> bool {
    true
}

fn default_probe_timeout_secs() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_thumbnail_edge_px() -> u32 {
    192
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    800
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_settings_roundtrip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("playback_settings.toml");

        let mut settings = PlaybackSettings::default();
        settings.target_loudness_db = -16.0;
        settings.no_repeat_enabled = false;
        settings.persist(&path).expect("persist");

        assert_eq!(PlaybackSettings::load(&path), settings);
    }

    #[test]
    fn test_missing_documents_load_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert_eq!(
            PlaybackSettings::load(&dir.path().join("playback_settings.toml")),
            PlaybackSettings::default()
        );
        assert_eq!(
            ViewPreferences::load(&dir.path().join("view_preferences.toml")),
            ViewPreferences::default()
        );
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("playback_settings.toml");
        std::fs::write(&path, "target_loudness_db = -20.0\n").expect("seed");

        let loaded = PlaybackSettings::load(&path);
        assert_eq!(loaded.target_loudness_db, -20.0);
        assert_eq!(loaded.max_gain_db, PlaybackSettings::default().max_gain_db);
    }
}
