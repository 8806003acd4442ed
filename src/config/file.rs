//! TOML configuration file loading
//!
//! Supports `~/.config/jarvis/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct JarvisConfigFile {
    /// Focus timing and pose thresholds
    #[serde(default)]
    pub thresholds: ThresholdsFileConfig,

    /// Speech synthesis
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Roast lines, spoken in order
    #[serde(default)]
    pub lines: Option<Vec<String>>,

    /// Line spoken when the orb is clicked
    #[serde(default)]
    pub click_line: Option<String>,

    /// Push channel for remote viewers
    #[serde(default)]
    pub bridge: BridgeFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ThresholdsFileConfig {
    pub away_hold_s: Option<f64>,
    pub cooldown_s: Option<f64>,
    pub smoothing_window: Option<usize>,
    pub smoothing_threshold: Option<f64>,
    pub yaw_deg: Option<f64>,
    pub pitch_deg: Option<f64>,
    pub gaze_center_min: Option<f64>,
    pub gaze_center_max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// "elevenlabs" or "openai"
    pub provider: Option<String>,
    pub voice_id: Option<String>,
    pub model: Option<String>,
    pub speaking_rate: Option<f32>,
    pub stability: Option<f32>,
    pub similarity_boost: Option<f32>,
    pub style: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BridgeFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub elevenlabs: Option<String>,
    pub openai: Option<String>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the contents are not valid TOML for this schema
pub fn parse_config(content: &str) -> Result<JarvisConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `JarvisConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> JarvisConfigFile {
    let Some(path) = config_file_path() else {
        return JarvisConfigFile::default();
    };

    if !path.exists() {
        return JarvisConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_or_default(&path, &content),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            JarvisConfigFile::default()
        }
    }
}

/// Load an explicitly requested config file
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be read. A file that reads
/// but does not parse falls back to defaults with a warning.
pub fn load_config_file_from(path: &Path) -> Result<JarvisConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    Ok(parse_or_default(path, &content))
}

fn parse_or_default(path: &Path, content: &str) -> JarvisConfigFile {
    match parse_config(content) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            JarvisConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/jarvis/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("jarvis").join("config.toml"))
}
