//! Background coordinator: the message-bus endpoint that owns synthesis.
//!
//! IDLE → AWAITING_PROVIDER → REPLYING → IDLE, once per request. Every
//! request gets exactly one reply through its [`Responder`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::{Message, Responder, SynthesisRequest, TtsReply};
use crate::config::{BridgeMode, Config};
use crate::error::{Result, TtsError};
use crate::provider::{audio_mime, AudioClip, ElevenLabsClient};
use crate::store::{SettingsExt, SettingsStore};

const REQUEST_QUEUE: usize = 32;

/// Where synthesized audio comes from.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioClip>;
}

/// Calls ElevenLabs directly with the credential held in the settings store.
pub struct DirectBackend {
    client: ElevenLabsClient,
    store: Arc<dyn SettingsStore>,
}

impl DirectBackend {
    pub fn new(client: ElevenLabsClient, store: Arc<dyn SettingsStore>) -> Self {
        Self { client, store }
    }
}

#[async_trait]
impl SynthesisBackend for DirectBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioClip> {
        // Read at call time so a key saved after startup is picked up.
        let credential = self.store.credential().await?;
        self.client
            .synthesize(&request.text, request.gender, credential.as_deref())
            .await
    }
}

/// Forwards to the hanashi server's `/tts` route; the key never leaves it.
pub struct HostedBackend {
    client: Client,
    tts_url: String,
}

impl HostedBackend {
    pub fn new(server_url: &str) -> Self {
        Self {
            client: Client::new(),
            tts_url: format!("{}/tts", server_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl SynthesisBackend for HostedBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioClip> {
        let response = self
            .client
            .post(&self.tts_url)
            .json(&json!({ "text": request.text, "gender": request.gender }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("TTS API error {status}: {body}");
            return Err(TtsError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let mime = audio_mime(response.headers());
        Ok(AudioClip::new(mime, response.bytes().await?.to_vec()))
    }
}

/// Pick the backend for the configured credential flow.
pub fn backend_from_config(config: &Config, store: Arc<dyn SettingsStore>) -> Arc<dyn SynthesisBackend> {
    match config.bridge.mode {
        BridgeMode::Hosted => {
            info!("Coordinator backend: hosted ({})", config.bridge.server_url);
            Arc::new(HostedBackend::new(&config.bridge.server_url))
        }
        BridgeMode::Direct => {
            info!("Coordinator backend: direct ElevenLabs");
            Arc::new(DirectBackend::new(ElevenLabsClient::new(&config.provider), store))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    AwaitingProvider,
    Replying { success: bool },
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::AwaitingProvider => write!(f, "AWAITING_PROVIDER"),
            Self::Replying { success: true } => write!(f, "REPLYING(success)"),
            Self::Replying { success: false } => write!(f, "REPLYING(failure)"),
        }
    }
}

struct Envelope {
    message: Message,
    responder: Responder,
}

#[derive(Clone)]
pub struct BackgroundCoordinator {
    backend: Arc<dyn SynthesisBackend>,
}

impl BackgroundCoordinator {
    pub fn new(backend: Arc<dyn SynthesisBackend>) -> Self {
        Self { backend }
    }

    /// Run the coordinator on its own task and return a handle for surfaces.
    ///
    /// Each request is served on a separate task, so several surfaces can
    /// be waiting at once.
    pub fn spawn(self) -> CoordinatorHandle {
        let (tx, mut rx) = mpsc::channel::<Envelope>(REQUEST_QUEUE);

        tokio::spawn(async move {
            while let Some(Envelope { message, responder }) = rx.recv().await {
                let coordinator = self.clone();
                tokio::spawn(async move {
                    let reply = coordinator.handle(message).await;
                    responder.respond(reply);
                });
            }
            debug!("Coordinator channel closed");
        });

        CoordinatorHandle { tx }
    }

    /// Drive one request to its reply.
    pub async fn handle(&self, message: Message) -> TtsReply {
        let Message::TtsRequest(request) = message;

        let mut state = RequestState::Idle;
        let result = if request.text.trim().is_empty() {
            Err(TtsError::empty_text())
        } else {
            state = self.transition(state, RequestState::AwaitingProvider);
            self.backend.synthesize(&request).await
        };

        let result = result.and_then(|clip| {
            if clip.bytes.is_empty() {
                Err(TtsError::Encoding("provider returned no audio".into()))
            } else {
                Ok(clip)
            }
        });

        if let Err(e) = &result {
            warn!("TTS request failed: {e}");
        }
        let reply = TtsReply::from(result);
        state = self.transition(state, RequestState::Replying { success: reply.success });
        self.transition(state, RequestState::Idle);
        reply
    }

    fn transition(&self, from: RequestState, to: RequestState) -> RequestState {
        debug!("State: {from} → {to}");
        to
    }
}

/// Sending side of the coordinator channel, held by surfaces.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Envelope>,
}

impl CoordinatorHandle {
    /// Send a message and wait for its reply.
    ///
    /// Fails with [`TtsError::Channel`] only when the coordinator is gone.
    pub async fn send(&self, message: Message) -> Result<TtsReply> {
        let (responder, rx) = Responder::channel();
        self.tx
            .send(Envelope { message, responder })
            .await
            .map_err(|_| TtsError::Channel("Could not establish connection. Receiving end does not exist.".into()))?;
        rx.await
            .map_err(|_| TtsError::Channel("The message port closed before a response was received.".into()))
    }

    /// Entry point for raw JSON messages. Anything that is not a well-formed
    /// `TTS_REQUEST` is answered with a failure reply.
    pub async fn send_json(&self, raw: &str) -> TtsReply {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => return TtsReply::err(format!("Malformed message: {e}")),
        };
        match value.get("type").and_then(|t| t.as_str()) {
            Some("TTS_REQUEST") => {}
            Some("SHOW_TTS_OVERLAY") => {
                return TtsReply::err("SHOW_TTS_OVERLAY is handled by the content overlay, not the coordinator")
            }
            Some(other) => return TtsReply::err(format!("Unsupported message type: {other}")),
            None => return TtsReply::err("Message has no type"),
        }
        let message: Message = match serde_json::from_value(value) {
            Ok(m) => m,
            Err(e) => return TtsReply::err(format!("Invalid TTS_REQUEST payload: {e}")),
        };
        match self.send(message).await {
            Ok(reply) => reply,
            Err(e) => TtsReply::err(e.to_string()),
        }
    }
}
