//! ElevenLabs text-to-speech client.
//!
//! One POST per synthesis call. The response body is kept as an opaque
//! blob together with its content type.

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{Result, TtsError};
use crate::voice::{Gender, VoiceSettings};

const XI_API_KEY_HEADER: &str = "xi-api-key";
pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

/// Opaque audio payload plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl AudioClip {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn is_audio(&self) -> bool {
        self.mime.starts_with("audio/")
    }
}

/// MIME type of an audio response: `Content-Type` without parameters,
/// falling back to [`DEFAULT_AUDIO_MIME`].
pub fn audio_mime(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_AUDIO_MIME)
        .to_string()
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    model_id: String,
}

impl ElevenLabsClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
        }
    }

    /// Synthesize `text` with the fixed voice for `gender`.
    ///
    /// A missing or blank credential fails with [`TtsError::Config`] before
    /// any request is made.
    pub async fn synthesize(
        &self,
        text: &str,
        gender: Gender,
        credential: Option<&str>,
    ) -> Result<AudioClip> {
        let api_key = credential
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(TtsError::missing_credential)?;

        let profile = gender.profile();
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, profile.voice_id);
        let body = SynthesizeRequest {
            text,
            model_id: &self.model_id,
            voice_settings: profile.settings,
        };

        debug!(
            "ElevenLabs request: voice={} ({gender}), {} chars",
            profile.name,
            text.chars().count()
        );

        let response = self
            .client
            .post(&url)
            .header(XI_API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("ElevenLabs API error {status}: {body}");
            return Err(TtsError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let mime = audio_mime(response.headers());
        let bytes = response.bytes().await?.to_vec();

        debug!("ElevenLabs returned {} bytes of {mime}", bytes.len());
        Ok(AudioClip::new(mime, bytes))
    }
}
