//! Presentation surface: the popup / overlay form, without the pixels.
//!
//! Holds `{text, gender, loading, error, audio_ref}` and talks to the
//! coordinator through a [`CoordinatorHandle`]. Host capabilities (storage,
//! messaging) are injected at construction instead of probed at runtime.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bridge::{Message, SurfaceMessage, SynthesisRequest, TtsReply};
use crate::coordinator::CoordinatorHandle;
use crate::error::Result;
use crate::store::{keys, PersistedUiState, SettingsExt, SettingsStore};
use crate::voice::Gender;

const MISSING_KEY: &str = "Please set your ElevenLabs API key first.";
const BLANK_KEY: &str = "Please enter your ElevenLabs API key first.";
const NO_MESSAGING: &str = "Cannot send TTS request outside of extension context.";
const NO_STORAGE: &str = "Settings storage is not available.";

/// Playback handle for generated audio. Playback itself lives elsewhere.
pub trait AudioPlayer: Send {
    /// Load and start playing `data_url`.
    fn play(&mut self, data_url: &str);
    fn pause(&mut self);
}

/// Player for surfaces with no audio output.
pub struct SilentPlayer;

impl AudioPlayer for SilentPlayer {
    fn play(&mut self, _data_url: &str) {}
    fn pause(&mut self) {}
}

/// What the host environment provides. `None` means unavailable.
#[derive(Clone, Default)]
pub struct HostCapabilities {
    pub storage: Option<Arc<dyn SettingsStore>>,
    pub messaging: Option<CoordinatorHandle>,
    /// Whether a locally stored provider key must exist before submitting
    /// (direct flow). The hosted flow keeps the key on the server.
    pub requires_credential: bool,
}

pub struct Surface {
    host: HostCapabilities,
    player: Box<dyn AudioPlayer>,
    text: String,
    gender: Gender,
    loading: bool,
    error: Option<String>,
    audio_ref: Option<String>,
    has_credential: bool,
    show_settings: bool,
    visible: bool,
    auto_submit: bool,
}

impl Surface {
    pub fn new(host: HostCapabilities, player: Box<dyn AudioPlayer>) -> Self {
        Self {
            host,
            player,
            text: String::new(),
            gender: Gender::Male,
            loading: false,
            error: None,
            audio_ref: None,
            has_credential: false,
            show_settings: false,
            visible: false,
            auto_submit: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn audio_ref(&self) -> Option<&str> {
        self.audio_ref.as_deref()
    }

    pub fn has_credential(&self) -> bool {
        self.has_credential
    }

    pub fn settings_visible(&self) -> bool {
        self.show_settings
    }

    pub fn auto_submit_pending(&self) -> bool {
        self.auto_submit
    }

    /// Restore the previous session and pick up context-selected text.
    ///
    /// Pending text wins over saved text and is consumed here; it schedules
    /// an auto-submit that waits until the surface is visible.
    pub async fn restore(&mut self) {
        let Some(store) = self.host.storage.clone() else {
            debug!("No storage capability, starting with an empty form");
            self.show_settings = self.host.requires_credential;
            return;
        };

        self.has_credential = match store.credential().await {
            Ok(key) => key.is_some(),
            Err(e) => {
                warn!("Failed to read credential: {e}");
                false
            }
        };
        if self.host.requires_credential && !self.has_credential {
            self.show_settings = true;
        }

        let saved = PersistedUiState::load(store.as_ref()).await;
        if let Some(pending) = saved.pending_text {
            info!("Picked up pending text ({} chars)", pending.chars().count());
            self.text = pending;
            self.auto_submit = true;
            if let Err(e) = store.remove(&[keys::PENDING_TEXT]).await {
                warn!("Failed to clear pending text: {e}");
            }
        } else if let Some(text) = saved.last_text {
            self.text = text;
        }
        if let Some(gender) = saved.last_gender {
            self.gender = gender;
        }
        if let Some(audio) = saved.last_audio_ref {
            self.audio_ref = Some(audio);
        }

        self.poll_auto_submit().await;
    }

    pub async fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        if !self.text.is_empty() {
            let text = self.text.clone();
            self.persist(keys::SAVED_TEXT, &text).await;
        }
    }

    pub async fn set_gender(&mut self, gender: Gender) {
        self.gender = gender;
        self.persist(keys::SAVED_GENDER, gender.as_str()).await;
    }

    /// Show or hide the surface. Becoming visible releases a deferred
    /// auto-submit; hiding pauses playback.
    pub async fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if visible {
            self.poll_auto_submit().await;
        } else {
            self.player.pause();
        }
    }

    async fn poll_auto_submit(&mut self) {
        if !self.auto_submit || !self.visible || self.text.is_empty() {
            return;
        }
        self.auto_submit = false;
        debug!("Auto-submitting pending text");
        self.submit().await;
    }

    /// Pre-fill the form with text picked on the page and show it.
    ///
    /// Nothing is sent until [`Surface::submit`]; any deferred auto-submit is
    /// superseded by the new text.
    pub fn show_with_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.visible = true;
        self.auto_submit = false;
        self.error = None;
        debug!("Overlay shown with {} chars", self.text.chars().count());
    }

    pub fn handle_message(&mut self, message: SurfaceMessage) -> TtsReply {
        match message {
            SurfaceMessage::ShowOverlay { text } => {
                self.show_with_text(text);
                TtsReply::ack()
            }
        }
    }

    /// Entry point for raw JSON messages sent to this surface.
    pub fn handle_json(&mut self, raw: &str) -> TtsReply {
        match serde_json::from_str::<SurfaceMessage>(raw) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                warn!("Ignoring surface message: {e}");
                TtsReply::err(format!("Unsupported surface message: {e}"))
            }
        }
    }

    pub fn toggle_settings(&mut self) {
        self.show_settings = !self.show_settings;
    }

    pub async fn save_api_key(&mut self, key: &str) {
        let key = key.trim();
        if key.is_empty() {
            self.error = Some(BLANK_KEY.into());
            return;
        }
        let Some(store) = self.host.storage.clone() else {
            self.error = Some(NO_STORAGE.into());
            return;
        };
        match store.set_string(keys::API_KEY, key).await {
            Ok(()) => {
                info!("API key saved");
                self.has_credential = true;
                self.show_settings = false;
                self.error = None;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    pub async fn clear_api_key(&mut self) {
        let Some(store) = self.host.storage.clone() else {
            self.error = Some(NO_STORAGE.into());
            return;
        };
        match store.remove(&[keys::API_KEY]).await {
            Ok(()) => {
                info!("API key cleared");
                self.has_credential = false;
                self.show_settings = true;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    /// Submit the form and wait for the coordinator's reply.
    pub async fn submit(&mut self) {
        let Some(request) = self.begin_submit().await else {
            return;
        };
        // begin_submit only hands out a request when messaging is available.
        let Some(handle) = self.host.messaging.clone() else {
            return;
        };
        let outcome = handle.send(Message::TtsRequest(request)).await;
        self.finish_submit(outcome).await;
    }

    /// First half of a submit: apply the guards and enter the loading state.
    ///
    /// Returns the request to dispatch, or `None` when nothing may be sent
    /// (already loading, blank text, missing credential, no messaging).
    pub async fn begin_submit(&mut self) -> Option<SynthesisRequest> {
        if self.loading {
            debug!("Submit ignored: request already in flight");
            return None;
        }
        let request = match SynthesisRequest::new(self.text.clone(), self.gender) {
            Ok(r) => r,
            Err(e) => {
                self.error = Some(e.to_string());
                return None;
            }
        };
        if self.host.requires_credential && !self.has_credential {
            self.error = Some(MISSING_KEY.into());
            self.show_settings = true;
            return None;
        }

        self.player.pause();
        self.loading = true;
        self.error = None;
        self.audio_ref = None;
        if let Some(store) = &self.host.storage {
            if let Err(e) = store.remove(&[keys::SAVED_AUDIO_URL]).await {
                warn!("Failed to clear saved audio: {e}");
            }
        }

        if self.host.messaging.is_none() {
            warn!("No messaging capability, cannot reach the coordinator");
            self.loading = false;
            self.error = Some(NO_MESSAGING.into());
            return None;
        }

        info!("Dispatching TTS_REQUEST ({}, {} chars)", request.gender, request.text.chars().count());
        Some(request)
    }

    /// Second half of a submit: apply the coordinator's reply.
    pub async fn finish_submit(&mut self, outcome: Result<TtsReply>) {
        self.loading = false;
        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                warn!("TTS request failed: {e}");
                self.error = Some(format!("Error: {e}"));
                return;
            }
        };

        match reply.into_result() {
            Ok(data_url) => {
                self.persist(keys::SAVED_AUDIO_URL, &data_url).await;
                self.player.play(&data_url);
                self.audio_ref = Some(data_url);
            }
            Err(message) => {
                warn!("TTS response error: {message}");
                self.error = Some(message);
            }
        }
    }

    /// Stop playback before the surface goes away.
    pub fn teardown(&mut self) {
        self.player.pause();
    }

    async fn persist(&self, key: &str, value: &str) {
        if let Some(store) = &self.host.storage {
            if let Err(e) = store.set_string(key, value).await {
                warn!("Failed to persist {key}: {e}");
            }
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.teardown();
    }
}
