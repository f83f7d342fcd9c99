//! Settings store: the key/value capability behind the popup state.
//!
//! Primary backend is a single JSON object on disk. When that location is
//! unusable the store falls back to an in-memory map whose keys carry a
//! `_dev` suffix, so fallback values never collide with primary ones.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::voice::Gender;

pub type Settings = HashMap<String, Value>;

/// Well-known keys, shared with the browser extension storage.
pub mod keys {
    pub const API_KEY: &str = "elevenLabsApiKey";
    pub const SAVED_TEXT: &str = "savedText";
    pub const SAVED_GENDER: &str = "savedGender";
    pub const SAVED_AUDIO_URL: &str = "savedAudioUrl";
    pub const PENDING_TEXT: &str = "pendingText";
}

pub const FALLBACK_SUFFIX: &str = "_dev";

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Values for `keys`. Absent keys are simply missing from the map.
    async fn get(&self, keys: &[&str]) -> Result<Settings>;

    async fn set(&self, values: Settings) -> Result<()>;

    async fn remove(&self, keys: &[&str]) -> Result<()>;
}

/// Convenience accessors on top of the raw key/value contract.
#[async_trait]
pub trait SettingsExt: SettingsStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut values = self.get(&[key]).await?;
        Ok(match values.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        })
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut values = Settings::new();
        values.insert(key.to_string(), Value::String(value.to_string()));
        self.set(values).await
    }

    /// Stored credential, treating blank values as absent.
    async fn credential(&self) -> Result<Option<String>> {
        Ok(self
            .get_string(keys::API_KEY)
            .await?
            .filter(|k| !k.trim().is_empty()))
    }
}

impl<T: SettingsStore + ?Sized> SettingsExt for T {}

// --- In-memory backend ---

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<Settings>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Settings> {
        let values = self.values.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|k| values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, new_values: Settings) -> Result<()> {
        self.values.lock().unwrap().extend(new_values);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut values = self.values.lock().unwrap();
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

// --- JSON file backend ---

pub struct JsonFileStore {
    path: PathBuf,
    // Serialises read-modify-write; last write wins across processes.
    io_lock: AsyncMutex<()>,
}

impl JsonFileStore {
    /// Open a store at `path`, creating the parent directory if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            io_lock: AsyncMutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        // Unreadable contents are dropped; the next write replaces the file.
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => {
                warn!("Settings file {} is not a JSON object, ignoring it", self.path.display());
                Ok(Map::new())
            }
            Err(e) => {
                warn!("Settings file {} is corrupt ({e}), ignoring it", self.path.display());
                Ok(Map::new())
            }
        }
    }

    async fn write_all(&self, values: &Map<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<Settings> {
        let _guard = self.io_lock.lock().await;
        let all = self.read_all().await?;
        Ok(keys
            .iter()
            .filter_map(|k| all.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, values: Settings) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let mut all = self.read_all().await?;
        all.extend(values);
        self.write_all(&all).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let mut all = self.read_all().await?;
        let before = all.len();
        for key in keys {
            all.remove(*key);
        }
        if all.len() == before {
            return Ok(());
        }
        self.write_all(&all).await
    }
}

// --- Fallback namespace ---

/// Wraps a store so every key gets `suffix` appended on the way in and
/// stripped on the way out.
pub struct Namespaced<S> {
    inner: S,
    suffix: &'static str,
}

impl<S> Namespaced<S> {
    pub fn new(inner: S, suffix: &'static str) -> Self {
        Self { inner, suffix }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn scoped(&self, key: &str) -> String {
        format!("{key}{}", self.suffix)
    }
}

#[async_trait]
impl<S: SettingsStore> SettingsStore for Namespaced<S> {
    async fn get(&self, keys: &[&str]) -> Result<Settings> {
        let scoped: Vec<String> = keys.iter().map(|k| self.scoped(k)).collect();
        let refs: Vec<&str> = scoped.iter().map(String::as_str).collect();
        let values = self.inner.get(&refs).await?;
        Ok(values
            .into_iter()
            .filter_map(|(k, v)| k.strip_suffix(self.suffix).map(|k| (k.to_string(), v)))
            .collect())
    }

    async fn set(&self, values: Settings) -> Result<()> {
        let scoped = values.into_iter().map(|(k, v)| (self.scoped(&k), v)).collect();
        self.inner.set(scoped).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let scoped: Vec<String> = keys.iter().map(|k| self.scoped(k)).collect();
        let refs: Vec<&str> = scoped.iter().map(String::as_str).collect();
        self.inner.remove(&refs).await
    }
}

/// Open the primary file store, or fall back to a namespaced in-memory one.
pub fn open_store(path: &Path) -> Arc<dyn SettingsStore> {
    match JsonFileStore::open(path) {
        Ok(store) => {
            info!("Settings store: {}", store.path().display());
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                "Settings store unavailable at {} ({e}), using local fallback",
                path.display()
            );
            Arc::new(Namespaced::new(MemoryStore::new(), FALLBACK_SUFFIX))
        }
    }
}

/// Snapshot of what a reopened surface restores. Purely a convenience cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedUiState {
    pub last_text: Option<String>,
    pub last_gender: Option<Gender>,
    pub last_audio_ref: Option<String>,
    pub pending_text: Option<String>,
}

impl PersistedUiState {
    /// Read the cache. Storage failures degrade to an empty state.
    pub async fn load(store: &dyn SettingsStore) -> Self {
        let values = match store
            .get(&[
                keys::PENDING_TEXT,
                keys::SAVED_TEXT,
                keys::SAVED_GENDER,
                keys::SAVED_AUDIO_URL,
            ])
            .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to restore UI state: {e}");
                return Self::default();
            }
        };

        let string = |key: &str| {
            values
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let state = Self {
            last_text: string(keys::SAVED_TEXT),
            last_gender: string(keys::SAVED_GENDER).and_then(|g| Gender::parse(&g)),
            last_audio_ref: string(keys::SAVED_AUDIO_URL),
            pending_text: string(keys::PENDING_TEXT),
        };
        debug!(
            "Restored UI state (pending={}, saved_text={}, audio={})",
            state.pending_text.is_some(),
            state.last_text.is_some(),
            state.last_audio_ref.is_some()
        );
        state
    }
}

/// Queue text picked outside the surface ("speak this"); the next surface
/// to open consumes it once.
pub async fn queue_pending_text(store: &dyn SettingsStore, text: &str) -> Result<()> {
    store.set_string(keys::PENDING_TEXT, text).await
}
