//! Error types for Jarvis focus

use thiserror::Error;

/// Result type alias for Jarvis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Jarvis focus
///
/// None of these are fatal to the frame loop: callers log them and keep
/// tracking attention with whatever still works.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable classification for a frame (treated as AWAY)
    #[error("classification unavailable: {0}")]
    Classification(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Playback could not be started
    #[error("playback error: {0}")]
    Playback(String),

    /// I/O failure on a single push-channel client
    #[error("client error: {0}")]
    Client(String),

    /// Malformed inbound push-channel payload
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding/decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}
