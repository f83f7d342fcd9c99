//! Error taxonomy shared by the bridge, the provider client and the server.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TtsError>;

#[derive(Error, Debug)]
pub enum TtsError {
    /// Missing credential or other local setup problem. Never reaches the network.
    #[error("{0}")]
    Config(String),

    /// Rejected before dispatch (e.g. empty text).
    #[error("{0}")]
    Validation(String),

    /// Non-2xx from the TTS provider or the hosted `/tts` route.
    #[error("TTS API error: {status} - {body}")]
    Provider { status: u16, body: String },

    /// Transliteration failed. Absorbed by the relay, never shown to users.
    #[error("transliteration failed: {0}")]
    Relay(String),

    /// The other end of the message channel went away.
    #[error("{0}")]
    Channel(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid audio data URL: {0}")]
    Encoding(String),
}

impl TtsError {
    pub fn missing_credential() -> Self {
        Self::Config("Please set your ElevenLabs API key in the extension settings.".into())
    }

    pub fn empty_text() -> Self {
        Self::Validation("Text is required".into())
    }
}

impl From<std::io::Error> for TtsError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for TtsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
