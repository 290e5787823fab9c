//! Settings management for the WebM converter
//!
//! Persists the encoder location, the last used encode parameters and the
//! last output folder between runs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::converter::ConversionRequest;

fn default_frame_rate() -> u32 {
    24
}

fn default_quality() -> u8 {
    30
}

/// User preferences (stored in config directory)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterSettings {
    /// Path to the FFmpeg executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_path: Option<PathBuf>,

    /// Output frame rate of the last successful run
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Constant rate factor of the last successful run
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Target bitrate of the last successful run (unset lets the encoder decide)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,

    /// Folder of the last output file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output_dir: Option<PathBuf>,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            encoder_path: None,
            frame_rate: default_frame_rate(),
            quality: default_quality(),
            bitrate: None,
            last_output_dir: None,
        }
    }
}

impl ConverterSettings {
    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("WebmConverter");
            p.push("settings.json");
            p
        })
    }

    /// Load settings from config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        Self::load_from_file(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "Ignoring unreadable settings: {}", e);
            Self::default()
        })
    }

    /// Save settings to config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = Self::settings_path() else {
            return Err(SettingsError::NoConfigDir);
        };
        self.save_to_file(&path)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        serde_json::from_str(&contents).map_err(SettingsError::Parse)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Io)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(SettingsError::Write)?;
        fs::write(path, json).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Build a request for `input` and `output` from the stored defaults
    pub fn request(&self, input: impl Into<String>, output: impl Into<String>) -> ConversionRequest {
        ConversionRequest::new(input, output)
            .with_frame_rate(self.frame_rate)
            .with_quality(self.quality)
            .with_bitrate(self.bitrate)
    }

    /// Keep the parameters and output folder of a finished request as the
    /// defaults for the next one
    pub fn remember_request(&mut self, request: &ConversionRequest) {
        self.frame_rate = request.frame_rate;
        self.quality = request.quality;
        self.bitrate = request.bitrate;
        if let Some(dir) = Path::new(&request.output)
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            self.last_output_dir = Some(dir.to_path_buf());
        }
    }

    /// Get the last output folder if it still exists
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.last_output_dir.clone().filter(|p| p.is_dir())
    }

    /// Get the encoder path if it still exists
    pub fn existing_encoder(&self) -> Option<PathBuf> {
        self.encoder_path.clone().filter(|p| p.is_file())
    }
}

/// Settings-related errors
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Write(serde_json::Error),
    NoConfigDir,
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::Parse(e) => write!(f, "Settings parse error: {}", e),
            SettingsError::Write(e) => write!(f, "Settings write error: {}", e),
            SettingsError::NoConfigDir => write!(f, "Could not find config directory"),
        }
    }
}

impl std::error::Error for SettingsError {}
