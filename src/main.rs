//! hanashi: hosted Japanese TTS server.

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hanashi::config::Config;
use hanashi::server::{self, TtsApiState};

#[derive(Parser, Debug)]
#[command(name = "hanashi", about = "Japanese text-to-speech server")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("hanashi starting");

    let mut config = Config::load(args.config.as_deref());
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    info!("Config loaded: {:?}", config.server);

    if config.provider.api_key.is_none() {
        warn!("ElevenLabs API key not configured, /tts will answer 500");
    }
    if config.relay.enabled && config.relay.api_key.is_none() {
        warn!("OpenAI API key not configured, text is sent without transliteration");
    }

    let state = TtsApiState::from_config(&config);
    server::serve(state, &config.server.host, config.server.port).await?;

    Ok(())
}
