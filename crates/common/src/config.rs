//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{VidcapError, VidcapResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where recordings are written.
    pub output_dir: PathBuf,

    /// Camera and preview settings.
    pub capture: CaptureDefaults,

    /// Default encoder parameters.
    pub recorder: RecorderDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Camera, preview, and worker lane parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDefaults {
    /// Camera selector: "back", "front", or a device id.
    pub camera: String,

    /// Preview buffer width in pixels.
    pub preview_width: u32,

    /// Preview buffer height in pixels.
    pub preview_height: u32,

    /// Start a preview session as soon as the camera opens.
    pub preview_on_open: bool,

    /// Upper bound for draining the worker lane on deactivation.
    pub worker_drain_timeout_ms: u64,
}

/// Container format produced by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[serde(rename = "3gp")]
    ThreeGpp,
    Mp4,
}

impl ContainerFormat {
    /// File extension used for output paths.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::ThreeGpp => "3gp",
            Self::Mp4 => "mp4",
        }
    }
}

/// Video codec used by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
}

/// Audio codec used by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Opus,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderDefaults {
    /// Output container.
    pub container: ContainerFormat,

    /// Video codec.
    pub video_codec: VideoCodec,

    /// Audio codec.
    pub audio_codec: AudioCodec,

    /// Whether the microphone is recorded alongside video.
    pub capture_audio: bool,

    /// Video bitrate in bits per second.
    pub video_bitrate: u32,

    /// Video frame rate.
    pub frame_rate: u32,

    /// Encoded video width.
    pub width: u32,

    /// Encoded video height.
    pub height: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vidcap=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            capture: CaptureDefaults::default(),
            recorder: RecorderDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            camera: "back".to_string(),
            preview_width: 960,
            preview_height: 720,
            preview_on_open: true,
            worker_drain_timeout_ms: 2000,
        }
    }
}

impl Default for RecorderDefaults {
    fn default() -> Self {
        Self {
            container: ContainerFormat::ThreeGpp,
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Aac,
            capture_audio: true,
            video_bitrate: 800 * 800,
            frame_rate: 30,
            width: 960,
            height: 720,
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

impl AppConfig {
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

    /// Reject values the capture pipeline cannot work with.
    pub fn validate(&self) -> VidcapResult<()> {
        if self.capture.preview_width == 0 || self.capture.preview_height == 0 {
            return Err(VidcapError::config("preview size must be non-zero"));
        }
        if self.recorder.width == 0 || self.recorder.height == 0 {
            return Err(VidcapError::config("video size must be non-zero"));
        }
        if self.recorder.frame_rate == 0 {
            return Err(VidcapError::config("frame rate must be non-zero"));
        }
        if self.recorder.video_bitrate == 0 {
            return Err(VidcapError::config("video bitrate must be non-zero"));
        }
        if self.capture.worker_drain_timeout_ms == 0 {
            return Err(VidcapError::config("worker drain timeout must be non-zero"));
        }
        Ok(())
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
    base.join("vidcap").join("config.json")
}

/// Default recordings directory.
fn default_output_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("vidcap").join("recordings")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recorder.video_bitrate, 640_000);
        assert_eq!(config.recorder.container.extension(), "3gp");
    }

    #[test]
    fn zero_frame_rate_is_rejected() {
        let mut config = AppConfig::default();
        config.recorder.frame_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(VidcapError::Config { .. })
        ));
    }

    #[test]
    fn recorder_defaults_use_lowercase_codec_names() {
        let json = serde_json::to_value(RecorderDefaults::default()).unwrap();
        assert_eq!(json["container"], "3gp");
        assert_eq!(json["video_codec"], "h264");
        assert_eq!(json["audio_codec"], "aac");
    }
}
