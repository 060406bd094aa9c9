//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Audio stream category used for operator feedback sounds.
///
/// The platform stream the shutter click is routed to is a build-time
/// decision; `ShutterConfig::stream` is the explicit override hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioStream {
    /// Regular system sounds; can be muted by the user.
    System,
    /// Enforced system sounds; not silenced by the ringer switch.
    SystemEnforced,
    /// Media playback stream.
    Media,
    /// Notification stream.
    Notification,
}

/// Stream the shutter sound plays on unless overridden in config.
pub const DEFAULT_SHUTTER_STREAM: AudioStream = AudioStream::SystemEnforced;

/// Global hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Shutter feedback settings.
    pub shutter: ShutterConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingDefaults {
    /// Container extension handed to the recording pipeline as the
    /// output hint (e.g. ".mp4"; ".m4a" records audio only).
    pub container_ext: String,

    /// Whether to attach an audio encoder alongside video.
    pub capture_audio: bool,

    /// Delay before the storage index is told about a finished
    /// recording, in milliseconds.
    pub media_ready_delay_ms: u64,
}

/// Shutter feedback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutterConfig {
    /// Stream the click plays on.
    pub stream: AudioStream,

    /// Playback volume in [0.0, 1.0].
    pub volume: f32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "camhub=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            recording: RecordingDefaults::default(),
            shutter: ShutterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            container_ext: ".mp4".to_string(),
            capture_audio: true,
            media_ready_delay_ms: 1000,
        }
    }
}

impl Default for ShutterConfig {
    fn default() -> Self {
        Self {
            stream: DEFAULT_SHUTTER_STREAM,
            volume: 0.2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl HubConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("camhub").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = HubConfig::default();
        assert_eq!(config.recording.container_ext, ".mp4");
        assert!(config.recording.capture_audio);
        assert_eq!(config.recording.media_ready_delay_ms, 1000);
        assert_eq!(config.shutter.stream, DEFAULT_SHUTTER_STREAM);
        assert!(config.shutter.volume > 0.0 && config.shutter.volume <= 1.0);
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = HubConfig::default();
        config.shutter.stream = AudioStream::Media;
        config.recording.media_ready_delay_ms = 250;

        let json = serde_json::to_string(&config).unwrap();
        let back: HubConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.shutter.stream, AudioStream::Media);
        assert_eq!(back.recording.media_ready_delay_ms, 250);
    }
}
