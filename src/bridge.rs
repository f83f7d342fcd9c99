//! Message contract between a presentation surface and the background
//! coordinator.
//!
//! Wire shapes match the extension runtime messages:
//! `{"type":"TTS_REQUEST","payload":{"text":..,"gender":..}}` answered by
//! `{"success":true,"dataUrl":..}` or `{"success":false,"error":..}`.
//! Surfaces also accept `{"type":"SHOW_TTS_OVERLAY","text":..}`, acknowledged
//! with a bare `{"success":true}`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::{Result, TtsError};
use crate::provider::AudioClip;
use crate::voice::Gender;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub gender: Gender,
}

impl SynthesisRequest {
    /// Build a request, rejecting blank text.
    pub fn new(text: impl Into<String>, gender: Gender) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(TtsError::empty_text());
        }
        Ok(Self { text, gender })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    #[serde(rename = "TTS_REQUEST")]
    TtsRequest(SynthesisRequest),
}

/// Messages addressed to a presentation surface rather than the coordinator.
///
/// `{"type":"SHOW_TTS_OVERLAY","text":..}` carries its text at the top level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SurfaceMessage {
    #[serde(rename = "SHOW_TTS_OVERLAY")]
    ShowOverlay { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TtsReply {
    pub fn ok(data_url: String) -> Self {
        Self {
            success: true,
            data_url: Some(data_url),
            error: None,
        }
    }

    /// Bare `{"success":true}` acknowledgement.
    pub fn ack() -> Self {
        Self {
            success: true,
            data_url: None,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data_url: None,
            error: Some(message.into()),
        }
    }

    /// Success with a data URL, or the error text (with a generic fallback).
    pub fn into_result(self) -> std::result::Result<String, String> {
        match self {
            Self {
                success: true,
                data_url: Some(url),
                ..
            } => Ok(url),
            Self { error, .. } => {
                Err(error.unwrap_or_else(|| "Unknown error from background script".into()))
            }
        }
    }
}

impl From<Result<AudioClip>> for TtsReply {
    fn from(result: Result<AudioClip>) -> Self {
        match result {
            Ok(clip) => Self::ok(encode_data_url(&clip)),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

/// `data:<mime>;base64,<payload>`
pub fn encode_data_url(clip: &AudioClip) -> String {
    format!("data:{};base64,{}", clip.mime, STANDARD.encode(&clip.bytes))
}

pub fn decode_data_url(url: &str) -> Result<AudioClip> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| TtsError::Encoding("missing data: scheme".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| TtsError::Encoding("missing ',' separator".into()))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| TtsError::Encoding("only base64 data URLs are supported".into()))?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| TtsError::Encoding(e.to_string()))?;
    Ok(AudioClip::new(mime, bytes))
}

/// Single-use reply handle for one request.
///
/// Consumed by [`Responder::respond`]. Dropping it unanswered still sends a
/// failure reply, so the requester is never left waiting.
pub struct Responder {
    tx: Option<oneshot::Sender<TtsReply>>,
}

impl Responder {
    pub fn channel() -> (Self, oneshot::Receiver<TtsReply>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn respond(mut self, reply: TtsReply) {
        if let Some(tx) = self.tx.take() {
            if tx.send(reply).is_err() {
                warn!("Requester went away before the reply was delivered");
            }
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!("Request dropped without a reply, sending failure");
            let _ = tx.send(TtsReply::err("The message port closed before a response was received."));
        }
    }
}
