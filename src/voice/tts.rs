//! Text-to-speech (TTS) synthesis backends

use std::io::Cursor;

use async_trait::async_trait;
use serde::Serialize;

use super::resample::apply_speaking_rate;
use crate::{Error, Result};

/// Accepted speaking-rate range
pub const MIN_RATE: f32 = 0.5;
pub const MAX_RATE: f32 = 2.0;

/// Mono PCM audio
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Turns text into speech samples
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` spoken at `rate` (1.0 = natural speed)
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable or returns unusable audio
    async fn synthesize(&self, text: &str, rate: f32) -> Result<Pcm>;
}

/// ElevenLabs voice tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.7,
            style: 0.3,
        }
    }
}

/// ElevenLabs text-to-speech
pub struct ElevenLabsSynth {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    model: String,
    settings: VoiceSettings,
}

impl ElevenLabsSynth {
    /// Create a new ElevenLabs synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the API key or voice id is missing
    pub fn new(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }
        if voice_id.is_empty() {
            return Err(Error::Config("ElevenLabs voice id required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id,
            model,
            settings: VoiceSettings::default(),
        })
    }

    #[must_use]
    pub const fn with_voice_settings(mut self, settings: VoiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override individual voice settings
    pub fn update_voice_settings(
        &mut self,
        stability: Option<f32>,
        similarity_boost: Option<f32>,
        style: Option<f32>,
    ) {
        if let Some(v) = stability {
            self.settings.stability = v;
        }
        if let Some(v) = similarity_boost {
            self.settings.similarity_boost = v;
        }
        if let Some(v) = style {
            self.settings.style = v;
        }
    }

    #[must_use]
    pub const fn voice_settings(&self) -> VoiceSettings {
        self.settings
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSynth {
    async fn synthesize(&self, text: &str, rate: f32) -> Result<Pcm> {
        #[derive(Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
            voice_settings: VoiceSettings,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.voice_id
        );

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
            voice_settings: self.settings,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        let pcm = decode_mp3(&audio)?;
        let samples = apply_speaking_rate(&pcm.samples, pcm.sample_rate, clamp_rate(rate))?;

        Ok(Pcm {
            samples,
            sample_rate: pcm.sample_rate,
        })
    }
}

/// `OpenAI` text-to-speech
pub struct OpenAiSynth {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    model: String,
}

impl OpenAiSynth {
    /// Create a new `OpenAI` synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, voice: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            model,
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynth {
    async fn synthesize(&self, text: &str, rate: f32) -> Result<Pcm> {
        #[derive(Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        // OpenAI applies the speed server-side
        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: clamp_rate(rate),
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        decode_mp3(&audio)
    }
}

fn clamp_rate(rate: f32) -> f32 {
    if rate.is_finite() {
        rate.clamp(MIN_RATE, MAX_RATE)
    } else {
        1.0
    }
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the stream is corrupt or contains no audio
pub fn decode_mp3(mp3_data: &[u8]) -> Result<Pcm> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Tts(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 || samples.is_empty() {
        return Err(Error::Tts("synthesized audio was empty".to_string()));
    }

    Ok(Pcm {
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_clamped() {
        assert!((clamp_rate(5.0) - MAX_RATE).abs() < f32::EPSILON);
        assert!((clamp_rate(0.1) - MIN_RATE).abs() < f32::EPSILON);
        assert!((clamp_rate(f32::NAN) - 1.0).abs() < f32::EPSILON);
        assert!((clamp_rate(1.2) - 1.2).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_keys_rejected() {
        assert!(ElevenLabsSynth::new(String::new(), "v".into(), "m".into()).is_err());
        assert!(ElevenLabsSynth::new("k".into(), String::new(), "m".into()).is_err());
        assert!(OpenAiSynth::new(String::new(), "alloy".into(), "tts-1".into()).is_err());
    }

    #[test]
    fn voice_settings_update_partially() {
        let mut synth = ElevenLabsSynth::new("k".into(), "v".into(), "m".into()).unwrap();
        synth.update_voice_settings(Some(0.9), None, Some(0.1));
        let s = synth.voice_settings();
        assert!((s.stability - 0.9).abs() < f32::EPSILON);
        assert!((s.similarity_boost - 0.7).abs() < f32::EPSILON);
        assert!((s.style - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn garbage_is_not_audio() {
        assert!(decode_mp3(b"definitely not an mp3").is_err());
    }
}
