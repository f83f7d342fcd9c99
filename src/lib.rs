//! hanashi: Japanese text-to-speech bridge.
//!
//! Components:
//! - `store`: settings key/value capability (file backed, namespaced fallback)
//! - `provider`: ElevenLabs synthesis client
//! - `relay`: OpenAI kanji → kana transliteration with fallback
//! - `bridge`: message contract, data URLs, single-use responder
//! - `coordinator`: background message endpoint driving synthesis
//! - `surface`: popup / overlay form state machine
//! - `server`: axum `/tts` service for the hosted flow

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod provider;
pub mod relay;
pub mod server;
pub mod store;
pub mod surface;
pub mod voice;

pub use error::{Result, TtsError};
