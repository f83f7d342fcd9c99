//! HTTP API server for hosted synthesis.
//!
//! `POST /tts` transliterates, synthesizes with ElevenLabs and returns raw
//! MP3 bytes. The provider and model keys stay on this side.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::provider::ElevenLabsClient;
use crate::relay::TransliterationRelay;
use crate::voice::Gender;

#[derive(Clone)]
pub struct TtsApiState {
    pub provider: Arc<ElevenLabsClient>,
    pub relay: Arc<TransliterationRelay>,
    pub api_key: Option<String>,
}

impl TtsApiState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider: Arc::new(ElevenLabsClient::new(&config.provider)),
            relay: Arc::new(TransliterationRelay::new(config.relay.clone())),
            api_key: config.provider.api_key.clone(),
        }
    }
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct TtsRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    gender: Option<Gender>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Build the axum router.
pub fn router(state: TtsApiState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/tts", post(handle_tts))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: TtsApiState, host: &str, port: u16) -> std::io::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("TTS API server listening on {addr}");
    axum::serve(listener, router(state)).await
}

// --- Handlers ---

async fn handle_root() -> &'static str {
    "Welcome to Hanashi! 🌸"
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn handle_tts(State(state): State<TtsApiState>, body: Bytes) -> Response {
    let req: TtsRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Rejected /tts body: {e}");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let Some(text) = req.text.filter(|t| !t.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Text is required");
    };
    let gender = req.gender.unwrap_or_default();

    // Checked before the relay so a misconfigured server makes no outbound calls.
    let Some(api_key) = state.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
        warn!("HTTP /tts: ElevenLabs API key not configured");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "ElevenLabs API key not configured");
    };

    let preview: String = text.chars().take(40).collect();
    info!(
        "HTTP /tts [{}]: \"{}{}\" ({} chars)",
        gender,
        preview.replace('\n', " "),
        if text.chars().count() > 40 { "..." } else { "" },
        text.chars().count(),
    );

    let t_start = std::time::Instant::now();
    let speech = state.relay.transliterate(&text).await;

    match state
        .provider
        .synthesize(&speech.text, gender, Some(api_key))
        .await
    {
        Ok(clip) => {
            info!(
                "TTS complete: transliterated={} bytes={} total={:.0}ms",
                speech.transliterated,
                clip.bytes.len(),
                t_start.elapsed().as_secs_f64() * 1000.0,
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "audio/mpeg".to_string()),
                    (header::CONTENT_LENGTH, clip.bytes.len().to_string()),
                ],
                clip.bytes,
            )
                .into_response()
        }
        Err(e) => {
            warn!("ElevenLabs API Error: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "TTS generation failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfig, RelayConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use mockito::Matcher;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state(provider_url: &str, relay_url: &str, api_key: Option<&str>) -> TtsApiState {
        let provider = ProviderConfig {
            base_url: provider_url.into(),
            ..ProviderConfig::default()
        };
        let relay = RelayConfig {
            base_url: relay_url.into(),
            api_key: Some("sk-openai".into()),
            timeout_secs: 5,
            ..RelayConfig::default()
        };
        TtsApiState {
            provider: Arc::new(ElevenLabsClient::new(&provider)),
            relay: Arc::new(TransliterationRelay::new(relay)),
            api_key: api_key.map(str::to_string),
        }
    }

    fn post_tts(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/tts")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_text_is_bad_request() {
        let app = router(state("http://127.0.0.1:9", "http://127.0.0.1:9", Some("k")));

        for body in [r#"{}"#, r#"{"text":"  "}"#, r#"{"text":null}"#, r#"{"text":null,"gender":null}"#] {
            let response = app.clone().oneshot(post_tts(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(json_body(response).await, json!({"error": "Text is required"}));
        }

        let response = app.oneshot(post_tts("not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unconfigured_key_is_server_error_without_outbound_calls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", Matcher::Any).expect(0).create_async().await;

        let app = router(state(&server.url(), &server.url(), None));
        let response = app.oneshot(post_tts(r#"{"text":"こんにちは"}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({"error": "ElevenLabs API key not configured"})
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transliterated_text_is_synthesized_with_default_female_voice() {
        let mut server = mockito::Server::new_async().await;
        let relay = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"にほんご"}}]}"#)
            .create_async()
            .await;
        let tts = server
            .mock("POST", "/v1/text-to-speech/RBnMinrYKeccY3vaUxlZ")
            .match_header("xi-api-key", "eleven-key")
            .match_body(Matcher::PartialJson(json!({"text": "にほんご"})))
            .with_status(200)
            .with_header("content-type", "audio/mpeg")
            .with_body(b"\xff\xfbmp3")
            .create_async()
            .await;

        let app = router(state(&server.url(), &server.url(), Some("eleven-key")));
        let response = app.oneshot(post_tts(r#"{"text":"日本語"}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"\xff\xfbmp3");
        relay.assert_async().await;
        tts.assert_async().await;
    }

    #[tokio::test]
    async fn relay_failure_falls_back_to_original_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .create_async()
            .await;
        let tts = server
            .mock("POST", "/v1/text-to-speech/GKDaBI8TKSBJVhsCLD6n")
            .match_body(Matcher::PartialJson(json!({"text": "東京"})))
            .with_status(200)
            .with_body("mp3")
            .create_async()
            .await;

        let app = router(state(&server.url(), &server.url(), Some("k")));
        let response = app
            .oneshot(post_tts(r#"{"text":"東京","gender":"male"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        tts.assert_async().await;
    }

    #[tokio::test]
    async fn provider_failure_is_generic_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"はい"}}]}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/v1/text-to-speech/RBnMinrYKeccY3vaUxlZ")
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let app = router(state(&server.url(), &server.url(), Some("k")));
        let response = app.oneshot(post_tts(r#"{"text":"はい"}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await, json!({"error": "TTS generation failed"}));
    }

    #[tokio::test]
    async fn root_and_health_respond() {
        let app = router(state("http://127.0.0.1:9", "http://127.0.0.1:9", None));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), "Welcome to Hanashi! 🌸");

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let health = json_body(response).await;
        assert_eq!(health["status"], "ok");
        assert!(health["timestamp"].is_string());
    }
}
