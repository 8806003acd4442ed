//! Configuration management for Jarvis focus
//!
//! Values are resolved as env > TOML file > defaults.

pub mod file;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::DEFAULT_CLICK_LINE;
use crate::focus::{FocusStateMachine, FocusTimings, StatusSmoother};
use crate::gaze::PoseThresholds;
use crate::voice::{ElevenLabsSynth, MAX_RATE, MIN_RATE, OpenAiSynth, Synthesizer, VoiceSettings};
use crate::{Error, Result};

use file::JarvisConfigFile;

/// Voice id shipped in the sample config; TTS stays off until it is replaced
pub const PLACEHOLDER_VOICE_ID: &str = "REPLACE_ME_WITH_YOUR_VOICE_ID";

/// Default push-channel port
pub const DEFAULT_BRIDGE_PORT: u16 = 8765;

/// Jarvis configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Focus timing and pose thresholds
    pub thresholds: ThresholdsConfig,

    /// Speech synthesis
    pub tts: TtsConfig,

    /// Roast lines (never empty)
    pub lines: Vec<String>,

    /// Line spoken on a click
    pub click_line: String,

    /// Push channel
    pub bridge: BridgeConfig,
}

/// Focus timing and pose thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdsConfig {
    pub away_hold_s: f64,
    pub cooldown_s: f64,
    pub smoothing_window: usize,
    pub smoothing_threshold: f64,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub gaze_center_min: f64,
    pub gaze_center_max: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            away_hold_s: 0.6,
            cooldown_s: 2.0,
            smoothing_window: 5,
            smoothing_threshold: 0.6,
            yaw_deg: 35.0,
            pitch_deg: 25.0,
            gaze_center_min: 0.25,
            gaze_center_max: 0.75,
        }
    }
}

impl ThresholdsConfig {
    #[must_use]
    pub fn timings(&self) -> FocusTimings {
        FocusTimings {
            away_hold: Duration::from_secs_f64(self.away_hold_s),
            cooldown: Duration::from_secs_f64(self.cooldown_s),
        }
    }

    #[must_use]
    pub const fn pose(&self) -> PoseThresholds {
        PoseThresholds {
            yaw_deg: self.yaw_deg,
            pitch_deg: self.pitch_deg,
            gaze_min: self.gaze_center_min,
            gaze_max: self.gaze_center_max,
        }
    }

    /// A fresh state machine with these thresholds
    #[must_use]
    pub fn focus_machine(&self) -> FocusStateMachine {
        FocusStateMachine::new(
            self.timings(),
            StatusSmoother::new(self.smoothing_window, self.smoothing_threshold),
        )
    }
}

/// Speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    #[default]
    ElevenLabs,
    OpenAi,
}

impl TtsProvider {
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::ElevenLabs => "eleven_multilingual_v2",
            Self::OpenAi => "tts-1",
        }
    }

    #[must_use]
    pub const fn default_voice(self) -> &'static str {
        match self {
            Self::ElevenLabs => PLACEHOLDER_VOICE_ID,
            Self::OpenAi => "alloy",
        }
    }
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elevenlabs" | "eleven" => Ok(Self::ElevenLabs),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub voice_id: String,
    pub model: String,
    pub speaking_rate: f32,
    pub voice_settings: VoiceSettings,
    pub elevenlabs_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl TtsConfig {
    /// Why speech is unavailable, if it is
    #[must_use]
    pub fn disabled_reason(&self) -> Option<String> {
        match self.provider {
            TtsProvider::ElevenLabs => {
                if self.voice_id.is_empty() || self.voice_id == PLACEHOLDER_VOICE_ID {
                    Some("no ElevenLabs voice id configured".to_string())
                } else if self.elevenlabs_api_key.as_deref().is_none_or(str::is_empty) {
                    Some("ELEVEN_API_KEY not set".to_string())
                } else {
                    None
                }
            }
            TtsProvider::OpenAi => self
                .openai_api_key
                .as_deref()
                .is_none_or(str::is_empty)
                .then(|| "OPENAI_API_KEY not set".to_string()),
        }
    }

    /// Build the configured synthesizer
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the provider is not usable
    pub fn build_synthesizer(&self) -> Result<Arc<dyn Synthesizer>> {
        if let Some(reason) = self.disabled_reason() {
            return Err(Error::Config(reason));
        }

        match self.provider {
            TtsProvider::ElevenLabs => {
                let synth = ElevenLabsSynth::new(
                    self.elevenlabs_api_key.clone().unwrap_or_default(),
                    self.voice_id.clone(),
                    self.model.clone(),
                )?
                .with_voice_settings(self.voice_settings);
                Ok(Arc::new(synth))
            }
            TtsProvider::OpenAi => {
                let synth = OpenAiSynth::new(
                    self.openai_api_key.clone().unwrap_or_default(),
                    self.voice_id.clone(),
                    self.model.clone(),
                )?;
                Ok(Arc::new(synth))
            }
        }
    }
}

/// Push-channel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub enabled: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_BRIDGE_PORT,
            enabled: true,
        }
    }
}

/// Roast lines used when the config file has none
#[must_use]
pub fn default_lines() -> Vec<String> {
    [
        "Sir, the screen is over here.",
        "Focus levels critically low. Deploying sarcasm.",
        "I've seen goldfish with a longer attention span.",
        "Distraction detected. Shall I alert the authorities?",
        "Eyes front, genius. The code won't write itself.",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl Config {
    /// Load configuration from an explicit file (or the default path) and
    /// the process environment
    ///
    /// # Errors
    ///
    /// Returns error if an explicit path cannot be read or values are invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::load_config_file_from(path)?,
            None => file::load_config_file(),
        };
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve a config from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is out of range
    pub fn from_sources<E>(fc: JarvisConfigFile, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let defaults = ThresholdsConfig::default();
        let t = fc.thresholds;
        let thresholds = ThresholdsConfig {
            away_hold_s: t.away_hold_s.unwrap_or(defaults.away_hold_s),
            cooldown_s: t.cooldown_s.unwrap_or(defaults.cooldown_s),
            smoothing_window: t.smoothing_window.unwrap_or(defaults.smoothing_window),
            smoothing_threshold: t.smoothing_threshold.unwrap_or(defaults.smoothing_threshold),
            yaw_deg: t.yaw_deg.unwrap_or(defaults.yaw_deg),
            pitch_deg: t.pitch_deg.unwrap_or(defaults.pitch_deg),
            gaze_center_min: t.gaze_center_min.unwrap_or(defaults.gaze_center_min),
            gaze_center_max: t.gaze_center_max.unwrap_or(defaults.gaze_center_max),
        };

        // TTS config (env > toml > default)
        let provider = match env("JARVIS_TTS_PROVIDER").or(fc.tts.provider) {
            Some(name) => name.parse()?,
            None => TtsProvider::default(),
        };
        let voice_defaults = VoiceSettings::default();
        let tts = TtsConfig {
            provider,
            voice_id: env("JARVIS_VOICE_ID")
                .or(fc.tts.voice_id)
                .unwrap_or_else(|| provider.default_voice().to_string()),
            model: fc
                .tts
                .model
                .unwrap_or_else(|| provider.default_model().to_string()),
            speaking_rate: fc.tts.speaking_rate.unwrap_or(1.2),
            voice_settings: VoiceSettings {
                stability: fc.tts.stability.unwrap_or(voice_defaults.stability),
                similarity_boost: fc
                    .tts
                    .similarity_boost
                    .unwrap_or(voice_defaults.similarity_boost),
                style: fc.tts.style.unwrap_or(voice_defaults.style),
            },
            elevenlabs_api_key: env("ELEVEN_API_KEY")
                .or_else(|| env("ELEVENLABS_API_KEY"))
                .or(fc.api_keys.elevenlabs),
            openai_api_key: env("OPENAI_API_KEY").or(fc.api_keys.openai),
        };

        let bridge_defaults = BridgeConfig::default();
        let port = match env("JARVIS_WS_PORT") {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|_| Error::Config(format!("invalid JARVIS_WS_PORT: {raw}")))?,
            ),
            None => fc.bridge.port,
        };
        let bridge = BridgeConfig {
            host: fc.bridge.host.unwrap_or(bridge_defaults.host),
            port: port.unwrap_or(bridge_defaults.port),
            enabled: fc.bridge.enabled.unwrap_or(bridge_defaults.enabled),
        };

        let lines = fc
            .lines
            .map(|lines| {
                lines
                    .into_iter()
                    .filter(|l| !l.trim().is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|lines| !lines.is_empty())
            .unwrap_or_else(default_lines);

        let config = Self {
            thresholds,
            tts,
            lines,
            click_line: fc
                .click_line
                .unwrap_or_else(|| DEFAULT_CLICK_LINE.to_string()),
            bridge,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(t.away_hold_s.is_finite() && t.away_hold_s >= 0.0) {
            return Err(Error::Config(format!(
                "away_hold_s must be non-negative, got {}",
                t.away_hold_s
            )));
        }
        if !(t.cooldown_s.is_finite() && t.cooldown_s >= 0.0) {
            return Err(Error::Config(format!(
                "cooldown_s must be non-negative, got {}",
                t.cooldown_s
            )));
        }
        if t.smoothing_window == 0 {
            return Err(Error::Config("smoothing_window must be at least 1".to_string()));
        }
        if !(t.smoothing_threshold > 0.0 && t.smoothing_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "smoothing_threshold must be in (0, 1], got {}",
                t.smoothing_threshold
            )));
        }
        if !(MIN_RATE..=MAX_RATE).contains(&self.tts.speaking_rate) {
            return Err(Error::Config(format!(
                "speaking_rate must be in [{MIN_RATE}, {MAX_RATE}], got {}",
                self.tts.speaking_rate
            )));
        }
        Ok(())
    }
}
