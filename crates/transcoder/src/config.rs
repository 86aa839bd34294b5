use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::preset;

/// Settings file used when none is given explicitly
pub const DEFAULT_CONFIG_FILE: &str = "tt_config.json";

/// Settings for one batch run, snapshotted when the run starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Path to the FFmpeg executable
    pub ffmpeg_path: PathBuf,
    /// Folder scanned for input videos
    pub input_path: PathBuf,
    /// Folder receiving `Fixed_*` outputs, created if absent
    pub output_dir: PathBuf,
    /// Display name of the filter preset
    pub preset: String,
    /// Per-file encoder timeout; none means wait indefinitely
    pub encoder_timeout_secs: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl BatchConfig {
    pub fn default_config() -> Self {
        Self {
            ffmpeg_path: PathBuf::new(),
            input_path: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            preset: preset::default_preset().name.to_string(),
            encoder_timeout_secs: None,
        }
    }

    pub fn encoder_timeout(&self) -> Option<Duration> {
        self.encoder_timeout_secs.map(Duration::from_secs)
    }

    /// Read settings from `path`. No path, or a path that does not exist
    /// yet, gives the defaults.
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.filter(|p| p.exists()) else {
            return Ok(Self::default_config());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let format = ConfigFormat::of(path);
        format
            .parse(&content)
            .with_context(|| format!("Failed to parse {} config: {}", format, path.display()))
    }

    /// Persist the configuration. Format follows the file extension.
    pub fn save_config(&self, path: &Path) -> Result<()> {
        let format = ConfigFormat::of(path);
        let content = format
            .render(self)
            .with_context(|| format!("Failed to serialize {} config", format))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}

/// On-disk settings format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }

    fn parse(self, content: &str) -> Result<BatchConfig> {
        Ok(match self {
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        })
    }

    fn render(self, config: &BatchConfig) -> Result<String> {
        Ok(match self {
            ConfigFormat::Json => serde_json::to_string_pretty(config)?,
            ConfigFormat::Toml => toml::to_string_pretty(config)?,
        })
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConfigFormat::Json => "JSON",
            ConfigFormat::Toml => "TOML",
        })
    }
}
