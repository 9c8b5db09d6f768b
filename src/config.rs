//! Configuration management.
//!
//! Loads and saves user configuration to the platform-standard config
//! directory (`camcheck/config.json`). A missing or invalid file falls back
//! to defaults; every timing constant in the pipeline lives here rather than
//! being a fixed contract.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Camera settings requested at device open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_camera_fps() -> u32 {
    30
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Classification settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    /// Luma variance above this counts as a subject.
    #[serde(default = "default_threshold")]
    pub variance_threshold: f64,
    /// How often a frame is sampled for classification.
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
}

fn default_threshold() -> f64 {
    400.0
}

fn default_sample_interval() -> u64 {
    1000
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 400.0,
            sample_interval_ms: 1000,
        }
    }
}

/// Clip capture settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "default_clip_seconds")]
    pub clip_seconds: u64,
    #[serde(default = "default_clip_fps")]
    pub clip_fps: u32,
}

fn default_clip_seconds() -> u64 {
    10
}

fn default_clip_fps() -> u32 {
    15
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            clip_seconds: 10,
            clip_fps: 15,
        }
    }
}

/// Control-thread task periods.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_display_refresh")]
    pub display_refresh_ms: u64,
    #[serde(default = "default_status_refresh")]
    pub status_refresh_ms: u64,
}

fn default_display_refresh() -> u64 {
    10
}

fn default_status_refresh() -> u64 {
    250
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            display_refresh_ms: 10,
            status_refresh_ms: 250,
        }
    }
}

/// Output-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OutputConfig {
    /// Custom output directory. If None, the current directory is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Get the path to the config file.
fn get_config_path() -> Result<PathBuf, String> {
    let proj_dirs =
        ProjectDirs::from("", "", "camcheck").ok_or("Could not determine config directory")?;
    Ok(proj_dirs.config_dir().join("config.json"))
}

/// Load configuration from disk.
/// Returns default config if the file doesn't exist or is invalid.
pub fn load_config() -> AppConfig {
    let config_path = match get_config_path() {
        Ok(path) => path,
        Err(e) => {
            warn!("Failed to get config path: {}", e);
            return AppConfig::default();
        }
    };

    if !config_path.exists() {
        debug!("No config file found, writing defaults");
        let defaults = AppConfig::default();
        if let Err(e) = save_config(&defaults) {
            warn!("Failed to write default config: {}", e);
        }
        return defaults;
    }

    match fs::read_to_string(&config_path) {
        Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
            Ok(config) => {
                debug!("Loaded config from {:?}", config_path);
                config
            }
            Err(e) => {
                warn!("Failed to parse config file: {}. Using defaults.", e);
                AppConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read config file: {}. Using defaults.", e);
            AppConfig::default()
        }
    }
}

/// Save configuration to disk, creating the config directory if needed.
pub fn save_config(config: &AppConfig) -> Result<(), String> {
    let config_path = get_config_path()?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(&config_path, json).map_err(|e| format!("Failed to write config file: {}", e))?;

    debug!("Saved config to {:?}", config_path);
    Ok(())
}

/// Get the configured output directory, falling back to the current
/// directory if not set.
pub fn get_output_dir(config: &AppConfig) -> PathBuf {
    match &config.output.directory {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("."),
    }
}

/// Validate that a directory exists and is writable.
pub fn validate_directory(path: &std::path::Path) -> Result<(), String> {
    if !path.exists() {
        return Err("Directory does not exist".to_string());
    }
    if !path.is_dir() {
        return Err("Path is not a directory".to_string());
    }
    let test_file = path.join(".camcheck_write_test");
    match fs::write(&test_file, "test") {
        Ok(()) => {
            let _ = fs::remove_file(test_file);
            Ok(())
        }
        Err(_) => Err("Directory is not writable".to_string()),
    }
}
