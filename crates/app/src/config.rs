use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use studio_core::session::{DEFAULT_TRACK_COUNT, DEFAULT_WAVEFORM_HEIGHT_PX};
use studio_core::{GridSettings, SessionSettings, TrackId};

/// Map a track number as shown in the track header to its id.
/// Track numbers start at 1, so 0 has no track.
pub fn track_from_number(number: u64) -> Option<TrackId> {
    number.checked_sub(1).map(TrackId)
}

/// Which device a track listens to when the app starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInput {
    /// One-based, as shown in the track header.
    pub track: u64,
    pub device: String,
}

impl TrackInput {
    pub fn track_id(&self) -> Option<TrackId> {
        track_from_number(self.track)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bpm: f64,
    pub pixels_per_second: f64,
    pub snap_enabled: bool,
    pub snap_resolution: f64,
    pub snap_tolerance_px: f64,
    pub track_count: usize,
    pub waveform_height_px: u32,
    /// Recordings past this size log a warning.
    pub large_recording_bytes: usize,
    pub track_inputs: Vec<TrackInput>,
}

impl Default for Config {
    fn default() -> Self {
        let settings = SessionSettings::default();
        Self {
            bpm: settings.bpm,
            pixels_per_second: settings.pixels_per_second,
            snap_enabled: settings.grid.snap_enabled,
            snap_resolution: settings.grid.snap_resolution,
            snap_tolerance_px: settings.grid.snap_tolerance_px,
            track_count: DEFAULT_TRACK_COUNT,
            waveform_height_px: DEFAULT_WAVEFORM_HEIGHT_PX,
            large_recording_bytes: settings.large_recording_bytes,
            track_inputs: Vec::new(),
        }
    }
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("studio").join("config.toml"))
    }

    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents),
            Err(_) => Self::default(),
        }
    }

    /// Unreadable files fall back to the defaults. Track inputs naming no
    /// track are dropped.
    pub fn parse(contents: &str) -> Self {
        let mut config: Self = toml::from_str(contents).unwrap_or_else(|err| {
            log::warn!("ignoring invalid config: {err}");
            Self::default()
        });
        config.track_inputs.retain(|input| {
            let valid = input.track_id().is_some();
            if !valid {
                log::warn!("ignoring input '{}' for track {}, tracks start at 1", input.device, input.track);
            }
            valid
        });
        config
    }

    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::config_path().ok_or_else(|| anyhow::anyhow!("no config directory on this system"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn settings(&self) -> SessionSettings {
        let pixels_per_second = if self.pixels_per_second > 0.0 {
            self.pixels_per_second
        } else {
            SessionSettings::default().pixels_per_second
        };
        SessionSettings {
            bpm: self.bpm,
            pixels_per_second,
            grid: GridSettings {
                snap_enabled: self.snap_enabled,
                snap_resolution: self.snap_resolution,
                snap_tolerance_px: self.snap_tolerance_px,
            },
            track_count: self.track_count.max(1),
            waveform_height_px: self.waveform_height_px,
            large_recording_bytes: self.large_recording_bytes,
            ..SessionSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse("bpm = 96.0\nsnap_enabled = false\n");
        assert_eq!(config.bpm, 96.0);
        assert!(!config.snap_enabled);
        assert_eq!(config.track_count, DEFAULT_TRACK_COUNT);
        assert!(config.track_inputs.is_empty());
    }

    #[test]
    fn test_invalid_file_is_ignored() {
        assert_eq!(Config::parse("bpm = \"fast\""), Config::default());
    }

    #[test]
    fn test_track_inputs() {
        let config = Config::parse(
            r#"
            [[track_inputs]]
            track = 2
            device = "USB Audio"
            "#,
        );
        assert_eq!(
            config.track_inputs,
            vec![TrackInput {
                track: 2,
                device: "USB Audio".to_string()
            }]
        );
    }

    #[test]
    fn test_track_zero_input_is_dropped() {
        let config = Config::parse(
            r#"
            [[track_inputs]]
            track = 0
            device = "usb"

            [[track_inputs]]
            track = 1
            device = "default"
            "#,
        );
        assert_eq!(config.track_inputs.len(), 1);
        assert_eq!(config.track_inputs[0].track_id(), Some(TrackId(0)));
        assert_eq!(track_from_number(0), None);
        assert_eq!(track_from_number(3), Some(TrackId(2)));
    }

    #[test]
    fn test_settings_sanitizes_layout() {
        let config = Config {
            pixels_per_second: 0.0,
            track_count: 0,
            ..Config::default()
        };
        let settings = config.settings();
        assert_eq!(settings.pixels_per_second, 100.0);
        assert_eq!(settings.track_count, 1);
        assert_eq!(settings.grid, GridSettings::default());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config {
            bpm: 140.0,
            track_inputs: vec![TrackInput {
                track: 1,
                device: "default".to_string(),
            }],
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::parse(&text), config);
    }
}
