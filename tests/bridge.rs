//! End-to-end: surface → coordinator → provider, for both credential flows.

use std::sync::{Arc, Mutex};

use mockito::Matcher;
use serde_json::json;

use hanashi::bridge::decode_data_url;
use hanashi::config::{ProviderConfig, RelayConfig};
use hanashi::coordinator::{BackgroundCoordinator, DirectBackend, HostedBackend};
use hanashi::provider::ElevenLabsClient;
use hanashi::server::{self, TtsApiState};
use hanashi::store::{keys, MemoryStore, SettingsExt, SettingsStore};
use hanashi::surface::{AudioPlayer, HostCapabilities, Surface};
use hanashi::voice::Gender;

#[derive(Clone, Default)]
struct LastPlayed(Arc<Mutex<Option<String>>>);

impl AudioPlayer for LastPlayed {
    fn play(&mut self, data_url: &str) {
        *self.0.lock().unwrap() = Some(data_url.to_string());
    }
    fn pause(&mut self) {}
}

async fn direct_surface(provider_url: &str, api_key: Option<&str>) -> (Surface, LastPlayed) {
    let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
    if let Some(key) = api_key {
        store.set_string(keys::API_KEY, key).await.unwrap();
    }
    let client = ElevenLabsClient::new(&ProviderConfig {
        base_url: provider_url.to_string(),
        ..ProviderConfig::default()
    });
    let backend = Arc::new(DirectBackend::new(client, store.clone()));
    let player = LastPlayed::default();
    let mut surface = Surface::new(
        HostCapabilities {
            storage: Some(store),
            messaging: Some(BackgroundCoordinator::new(backend).spawn()),
            requires_credential: true,
        },
        Box::new(player.clone()),
    );
    surface.restore().await;
    surface.set_visible(true).await;
    (surface, player)
}

#[tokio::test]
async fn konnichiwa_female_reaches_audio_ready() {
    let mut server = mockito::Server::new_async().await;
    let audio = b"\xff\xfb\x90\x64fake-mpeg-frame".to_vec();
    let mock = server
        .mock("POST", "/v1/text-to-speech/RBnMinrYKeccY3vaUxlZ")
        .match_header("xi-api-key", "sk-test")
        .with_status(200)
        .with_header("content-type", "audio/mpeg")
        .with_body(&audio)
        .create_async()
        .await;

    let (mut surface, player) = direct_surface(&server.url(), Some("sk-test")).await;
    surface.set_text("こんにちは").await;
    surface.set_gender(Gender::Female).await;
    surface.submit().await;

    mock.assert_async().await;
    assert!(!surface.is_loading());
    assert_eq!(surface.error(), None);
    let audio_ref = surface.audio_ref().expect("audio ready");
    let clip = decode_data_url(audio_ref).unwrap();
    assert_eq!(clip.mime, "audio/mpeg");
    assert_eq!(clip.bytes, audio);
    assert_eq!(player.0.lock().unwrap().as_deref(), Some(audio_ref));
}

#[tokio::test]
async fn provider_rejection_surfaces_its_message() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", Matcher::Regex("^/v1/text-to-speech/".into()))
        .with_status(500)
        .with_body("TTS API error from test")
        .create_async()
        .await;

    let (mut surface, _) = direct_surface(&server.url(), Some("sk-test")).await;
    surface.set_text("エラーテスト").await;
    surface.submit().await;

    assert!(!surface.is_loading());
    assert_eq!(surface.audio_ref(), None);
    assert!(surface.error().unwrap().contains("TTS API error from test"));
}

#[tokio::test]
async fn absent_credential_makes_no_network_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", Matcher::Any).expect(0).create_async().await;

    let (mut surface, _) = direct_surface(&server.url(), None).await;
    surface.set_text("こんにちは").await;
    surface.submit().await;

    assert!(surface.error().is_some());
    assert!(surface.settings_visible());
    mock.assert_async().await;
}

#[tokio::test]
async fn hosted_flow_goes_through_the_server() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"content":"こんにちは"}}]}"#)
        .create_async()
        .await;
    let tts = upstream
        .mock("POST", "/v1/text-to-speech/GKDaBI8TKSBJVhsCLD6n")
        .match_header("xi-api-key", "server-side-key")
        .match_body(Matcher::PartialJson(json!({"text": "こんにちは"})))
        .with_status(200)
        .with_header("content-type", "audio/mpeg")
        .with_body("hosted-mp3")
        .create_async()
        .await;

    let state = TtsApiState {
        provider: Arc::new(ElevenLabsClient::new(&ProviderConfig {
            base_url: upstream.url(),
            ..ProviderConfig::default()
        })),
        relay: Arc::new(hanashi::relay::TransliterationRelay::new(RelayConfig {
            base_url: upstream.url(),
            api_key: Some("sk-openai".into()),
            ..RelayConfig::default()
        })),
        api_key: Some("server-side-key".into()),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(state)).await.unwrap();
    });

    let backend = Arc::new(HostedBackend::new(&format!("http://{addr}")));
    let mut surface = Surface::new(
        HostCapabilities {
            storage: Some(Arc::new(MemoryStore::new())),
            messaging: Some(BackgroundCoordinator::new(backend).spawn()),
            requires_credential: false,
        },
        Box::new(LastPlayed::default()),
    );
    surface.restore().await;
    surface.set_text("今日は").await;
    surface.submit().await;

    assert_eq!(surface.error(), None);
    let clip = decode_data_url(surface.audio_ref().unwrap()).unwrap();
    assert_eq!(clip.bytes, b"hosted-mp3");
    tts.assert_async().await;
}
