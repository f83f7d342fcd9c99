//! Kanji → kana transliteration through an OpenAI chat completion.
//!
//! Best-effort: any failure hands back the original text so synthesis can
//! proceed without it.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::error::TtsError;

const SYSTEM_PROMPT: &str = r#"You are a helpful Japanese language assistant that specializes in transliterating kanji to kana.

Your main capabilities include:
1. Converting kanji characters to their kana readings, preserving the katakana when it is present.

There is no need to explain the transliteration, just return the kana readings. kana in this instance is hiragana or katakana.

NEVER RETURN ROMAJI.
YOU ARE NOT ALLOWED TO DO ANYTHING ELSE."#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transliteration {
    pub text: String,
    #[serde(skip)]
    pub transliterated: bool,
}

impl Transliteration {
    fn original(text: &str) -> Self {
        Self {
            text: text.to_string(),
            transliterated: false,
        }
    }
}

pub struct TransliterationRelay {
    config: RelayConfig,
    client: Client,
}

impl TransliterationRelay {
    pub fn new(config: RelayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build relay HTTP client ({e}), using defaults");
                Client::new()
            });

        Self { config, client }
    }

    /// Convert kanji in `text` to kana, or return `text` unchanged.
    pub async fn transliterate(&self, text: &str) -> Transliteration {
        if !self.config.enabled || text.trim().is_empty() {
            return Transliteration::original(text);
        }

        match self.request(text).await {
            Ok(kana) => {
                debug!("Transliterated {} chars → {} chars", text.chars().count(), kana.chars().count());
                Transliteration {
                    text: kana,
                    transliterated: true,
                }
            }
            Err(e) => {
                warn!("{e}, using original text");
                Transliteration::original(text)
            }
        }
    }

    async fn request(&self, text: &str) -> Result<String, TtsError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TtsError::Relay("OpenAI API key not configured".into()))?;

        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text }
            ]
        });
        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TtsError::Relay(format!("cannot connect to {}", self.config.base_url))
                } else if e.is_timeout() {
                    TtsError::Relay("request timed out".into())
                } else {
                    TtsError::Relay(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(TtsError::Relay(format!("model returned status {}", resp.status())));
        }

        let data = resp
            .json::<serde_json::Value>()
            .await
            .map_err(|e| TtsError::Relay(format!("unparseable response: {e}")))?;

        let result = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        if result.is_empty() {
            return Err(TtsError::Relay("model returned empty response".into()));
        }
        Ok(result)
    }
}
