//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CadenceError, CadenceResult};
use crate::tolerance::DEFAULT_TOLERANCE;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Scene timing and continuity settings.
    pub timing: TimingConfig,

    /// Audio-master synchronization settings.
    pub sync: SyncConfig,

    /// Output encoding parameters.
    pub output: OutputConfig,

    /// Directory for per-job scratch files and rendered outputs.
    pub work_dir: PathBuf,

    /// Cache probed media durations for the lifetime of a pipeline.
    pub cache_durations: bool,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Scene timing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Absolute tolerance for duration comparisons (seconds).
    pub tolerance: f64,

    /// Minimum per-scene duration (seconds).
    pub min_scene_duration: Option<f64>,

    /// Maximum per-scene duration (seconds).
    pub max_scene_duration: Option<f64>,

    /// Minimum duration a scene may have after gap repair (seconds).
    pub min_repaired_scene_duration: Option<f64>,
}

/// How a clip shorter than its target is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendStrategy {
    /// Repeat the clip from the beginning.
    Loop,
    /// Hold the final frame.
    FreezeLast,
    /// Pad with black frames.
    Black,
}

/// Which part of a clip longer than its target is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimStrategy {
    FromStart,
    #[default]
    FromEnd,
    Center,
}

/// Audio-master synchronization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub extend_strategy: Option<ExtendStrategy>,
    pub trim_strategy: TrimStrategy,

    /// Retime clips instead of trimming or extending them.
    pub adjust_speed: bool,

    pub fade_in_margin: f64,
    pub fade_out_margin: f64,

    /// Lower bound applied to every sync target before margins.
    pub min_video_duration: Option<f64>,
}

/// Container/codec combination for rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Mp4H264,
    Mp4H265,
    Webm,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4H264 | OutputFormat::Mp4H265 => "mp4",
            OutputFormat::Webm => "webm",
        }
    }

    pub fn video_codec(self) -> &'static str {
        match self {
            OutputFormat::Mp4H264 => "libx264",
            OutputFormat::Mp4H265 => "libx265",
            OutputFormat::Webm => "libvpx-vp9",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" | "mp4-h264" | "h264" => Ok(OutputFormat::Mp4H264),
            "mp4-h265" | "h265" | "hevc" => Ok(OutputFormat::Mp4H265),
            "webm" => Ok(OutputFormat::Webm),
            other => Err(CadenceError::config(format!(
                "unknown output format '{other}' (expected mp4-h264, mp4-h265, or webm)"
            ))),
        }
    }
}

/// Output encoding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: OutputFormat,

    /// Video bitrate in ffmpeg notation (e.g. "2000k").
    pub bitrate: String,
    pub audio_codec: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "cadence=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            sync: SyncConfig::default(),
            output: OutputConfig::default(),
            work_dir: default_work_dir(),
            cache_durations: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            min_scene_duration: None,
            max_scene_duration: None,
            min_repaired_scene_duration: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            extend_strategy: None,
            trim_strategy: TrimStrategy::FromEnd,
            adjust_speed: false,
            fade_in_margin: 0.0,
            fade_out_margin: 0.0,
            min_video_duration: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            format: OutputFormat::Mp4H264,
            bitrate: "2000k".to_string(),
            audio_codec: "aac".to_string(),
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

impl TimingConfig {
    /// Reject tolerances and scene bounds the timing engine cannot honor.
    pub fn validate(&self) -> CadenceResult<()> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(CadenceError::config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if let (Some(min), Some(max)) = (self.min_scene_duration, self.max_scene_duration) {
            if min > max {
                return Err(CadenceError::config(format!(
                    "min_scene_duration ({min}) exceeds max_scene_duration ({max})"
                )));
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Unlike [`AppConfig::load`], failures are errors.
    pub fn load_from(path: &Path) -> CadenceResult<Self> {
        if !path.exists() {
            return Err(CadenceError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.timing.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("cadence").join("config.json")
}

/// Default scratch directory for jobs.
fn default_work_dir() -> PathBuf {
    let base = std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".cache")
        });
    base.join("cadence").join("jobs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "timing": { "max_scene_duration": 8.0 }, "sync": { "trim_strategy": "center" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timing.max_scene_duration, Some(8.0));
        assert_eq!(config.timing.tolerance, DEFAULT_TOLERANCE);
        assert_eq!(config.sync.trim_strategy, TrimStrategy::Center);
        assert_eq!(config.output.fps, 30);
        assert_eq!(config.output.bitrate, "2000k");
    }

    #[test]
    fn test_timing_validate_rejects_inverted_bounds() {
        let timing = TimingConfig {
            min_scene_duration: Some(10.0),
            max_scene_duration: Some(5.0),
            ..TimingConfig::default()
        };
        assert!(timing.validate().is_err());
    }

    #[test]
    fn test_extend_strategy_serde_names() {
        let json = serde_json::to_string(&ExtendStrategy::FreezeLast).unwrap();
        assert_eq!(json, "\"freeze_last\"");
        let parsed: OutputFormat = serde_json::from_str("\"mp4-h265\"").unwrap();
        assert_eq!(parsed, OutputFormat::Mp4H265);
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("webm".parse::<OutputFormat>().unwrap(), OutputFormat::Webm);
        assert_eq!("MP4".parse::<OutputFormat>().unwrap(), OutputFormat::Mp4H264);
        assert!("avi".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_save_and_load_from_explicit_path() {
        let dir = std::env::temp_dir().join(format!("cadence-config-{}", std::process::id()));
        let path = dir.join("config.json");
        let mut config = AppConfig::default();
        config.cache_durations = true;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert!(loaded.cache_durations);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
