//! hanashi-speak: terminal surface for the TTS bridge.
//!
//! Runs the same surface → coordinator → provider path as the extension
//! popup and writes the generated audio to a file. `--queue` stores text as
//! the pending "speak this" selection for the next surface instead, and
//! `--show` delivers it as a `SHOW_TTS_OVERLAY` message without generating.

use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use hanashi::bridge::{decode_data_url, SurfaceMessage};
use hanashi::config::{BridgeMode, Config};
use hanashi::coordinator::{backend_from_config, BackgroundCoordinator};
use hanashi::store::{open_store, queue_pending_text};
use hanashi::surface::{AudioPlayer, HostCapabilities, Surface};
use hanashi::voice::Gender;

#[derive(Parser, Debug)]
#[command(name = "hanashi-speak", about = "Generate Japanese speech from the terminal")]
struct Args {
    /// Text to speak; `-` reads stdin. Empty uses pending or saved text.
    text: Vec<String>,

    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Voice gender: male or female
    #[arg(short, long)]
    gender: Option<String>,

    /// Credential flow
    #[arg(short, long, value_enum)]
    mode: Option<BridgeMode>,

    /// Where to write the audio
    #[arg(short, long, default_value = "hanashi.mp3")]
    out: PathBuf,

    /// Store the text as pending selection and exit
    #[arg(long)]
    queue: bool,

    /// Show the text in the overlay without generating speech
    #[arg(long, conflicts_with = "queue")]
    show: bool,

    /// Save an ElevenLabs API key for the direct flow
    #[arg(long)]
    api_key: Option<String>,

    /// Remove the saved API key
    #[arg(long)]
    clear_key: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

/// Writes each generated clip to disk instead of playing it.
struct FilePlayer {
    out: PathBuf,
}

impl AudioPlayer for FilePlayer {
    fn play(&mut self, data_url: &str) {
        match decode_data_url(data_url) {
            Ok(clip) => match std::fs::write(&self.out, &clip.bytes) {
                Ok(()) => info!("Saved {} bytes of {} to {}", clip.bytes.len(), clip.mime, self.out.display()),
                Err(e) => warn!("Failed to write {}: {e}", self.out.display()),
            },
            Err(e) => warn!("Unplayable audio: {e}"),
        }
    }

    fn pause(&mut self) {
        debug!("pause");
    }
}

fn read_text(args: &[String]) -> std::io::Result<String> {
    if args.len() == 1 && args[0] == "-" {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        return Ok(input.trim().to_string());
    }
    Ok(args.join(" "))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(args.config.as_deref());
    if let Some(mode) = args.mode {
        config.bridge.mode = mode;
    }
    let store = open_store(&config.store.resolved_path());
    let text = read_text(&args.text)?;

    if args.queue {
        if text.trim().is_empty() {
            return Err("nothing to queue".into());
        }
        queue_pending_text(store.as_ref(), &text).await?;
        info!("Queued {} chars for the next surface", text.chars().count());
        return Ok(());
    }

    let backend = backend_from_config(&config, store.clone());
    let host = HostCapabilities {
        storage: Some(store),
        messaging: Some(BackgroundCoordinator::new(backend).spawn()),
        requires_credential: config.bridge.mode == BridgeMode::Direct,
    };
    let mut surface = Surface::new(host, Box::new(FilePlayer { out: args.out.clone() }));
    surface.restore().await;

    if args.clear_key {
        surface.clear_api_key().await;
    }
    if let Some(key) = &args.api_key {
        surface.save_api_key(key).await;
        if let Some(error) = surface.error() {
            return Err(error.into());
        }
    }
    if let Some(gender) = &args.gender {
        let gender = Gender::parse(gender).ok_or("gender must be male or female")?;
        surface.set_gender(gender).await;
    }

    let explicit_text = !text.trim().is_empty();
    if args.show {
        if !explicit_text {
            return Err("nothing to show".into());
        }
        let message = SurfaceMessage::ShowOverlay { text };
        debug!("Surface message: {}", serde_json::to_string(&message)?);
        let reply = surface.handle_message(message);
        info!(
            "Overlay showing {} chars (success={}), press generate to speak",
            surface.text().chars().count(),
            reply.success
        );
        surface.teardown();
        return Ok(());
    }
    if explicit_text {
        surface.set_text(text).await;
    }

    let pending = surface.auto_submit_pending();
    let settings_only = !explicit_text && (args.api_key.is_some() || args.clear_key);
    // Becoming visible releases a pending auto-submit.
    surface.set_visible(true).await;
    if !pending && !settings_only {
        surface.submit().await;
    }

    if let Some(error) = surface.error() {
        return Err(error.into());
    }
    if surface.audio_ref().is_some() {
        info!("Done: {}", args.out.display());
    }
    surface.teardown();
    Ok(())
}
