/// tandemctl - inspect and drive the Tandem Player caches from a terminal
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tandem_core::{
    EngineConfig, JsonFileStore, KeyValueStore, MemoryStore, RepeatMode, SystemClock, Track,
    TrackId,
};
use tandem_playback::{
    ArtistImageCache, PlaybackStore, StreamCache, Transition, ARTIST_IMAGES_CACHE_KEY,
    STREAM_CACHE_KEY,
};
use tandem_server_client::{ServerConfig, TandemServerClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tandemctl")]
#[command(about = "Tandem Player stream resolution and cache tool", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TANDEM_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the stream handle for a remote track
    Resolve {
        /// Track title
        #[arg(short, long)]
        title: String,
        /// Artist credit
        #[arg(short, long)]
        artist: String,
        /// Duration hint in seconds
        #[arg(short, long)]
        duration: Option<f64>,
    },
    /// Fetch artist images for the primary artist of a credit
    Images {
        /// Artist credit
        artist: String,
        /// Ignore cached images
        #[arg(short, long)]
        force: bool,
    },
    /// Inspect or empty the persisted caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show or change the persisted repeat mode
    Repeat {
        #[command(subcommand)]
        action: RepeatAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts
    Stats,
    /// Remove every persisted cache entry
    Clear,
}

#[derive(Subcommand)]
enum RepeatAction {
    /// Print the current mode
    Show,
    /// Set the mode (none, all, one)
    Set {
        #[arg(value_parser = parse_repeat)]
        mode: RepeatMode,
    },
}

fn parse_repeat(value: &str) -> Result<RepeatMode, String> {
    RepeatMode::from_str(&value.to_ascii_lowercase())
        .ok_or_else(|| format!("unknown repeat mode {value:?} (expected none, all or one)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=info,tandemctl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let store = open_store(&config)?;

    match cli.command {
        Commands::Resolve {
            title,
            artist,
            duration,
        } => resolve(&config, store, title, artist, duration).await?,
        Commands::Images { artist, force } => images(&config, store, &artist, force).await?,
        Commands::Cache { action } => match action {
            CacheAction::Stats => cache_stats(&config, store)?,
            CacheAction::Clear => cache_clear(store.as_ref())?,
        },
        Commands::Repeat { action } => {
            let playback = PlaybackStore::new(store);
            match action {
                RepeatAction::Show => println!("{}", playback.repeat()),
                RepeatAction::Set { mode } => {
                    playback.dispatch(Transition::SetRepeat(mode));
                    println!("repeat mode set to {}", playback.repeat());
                }
            }
        }
    }

    Ok(())
}

/// Persisted store from the configured data directory, or memory only
fn open_store(config: &EngineConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match config.store_path() {
        Some(path) => {
            let store = JsonFileStore::open(&path)
                .with_context(|| format!("opening store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("cache.data_dir is not set; nothing will be persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn server_client(config: &EngineConfig) -> anyhow::Result<Arc<TandemServerClient>> {
    let client = TandemServerClient::new(ServerConfig::from(&config.server))
        .context("creating server client")?;
    Ok(Arc::new(client))
}

async fn resolve(
    config: &EngineConfig,
    store: Arc<dyn KeyValueStore>,
    title: String,
    artist: String,
    duration: Option<f64>,
) -> anyhow::Result<()> {
    let client = server_client(config)?;
    let cache = StreamCache::new(client, store, Arc::new(SystemClock), config);

    let mut track = Track::new(TrackId::new("remote-cli"), title, artist);
    track.duration = duration;

    if let Some(handle) = cache.cached(&track) {
        tracing::info!(fingerprint = %track.fingerprint(), "Using cached handle");
        println!("{handle}");
        return Ok(());
    }

    let handle = cache
        .resolve(&track)
        .await
        .with_context(|| format!("resolving {:?} by {:?}", track.title, track.artist))?;
    println!("{handle}");
    Ok(())
}

async fn images(
    config: &EngineConfig,
    store: Arc<dyn KeyValueStore>,
    artist: &str,
    force: bool,
) -> anyhow::Result<()> {
    let client = server_client(config)?;
    let cache = ArtistImageCache::new(client, store, Arc::new(SystemClock), config);

    let found = cache.fetch_artist_images(artist, force).await;
    if found.is_empty() {
        println!("no images found for {}", tandem_core::primary_artist(artist));
    }
    for url in found {
        println!("{url}");
    }
    Ok(())
}

fn cache_stats(config: &EngineConfig, store: Arc<dyn KeyValueStore>) -> anyhow::Result<()> {
    let client = server_client(config)?;
    let clock = Arc::new(SystemClock);
    let streams = StreamCache::new(client.clone(), store.clone(), clock.clone(), config);
    let images = ArtistImageCache::new(client, store, clock, config);

    println!(
        "stream handles: {} fresh, {} stored (cap {}, {} days)",
        streams.len(),
        streams.persisted_len(),
        config.cache.stream_capacity,
        config.cache.stream_horizon_days
    );
    println!(
        "artist images:  {} fresh (cap {}, {} days)",
        images.len(),
        config.cache.image_capacity,
        config.cache.image_horizon_days
    );
    Ok(())
}

fn cache_clear(store: &dyn KeyValueStore) -> anyhow::Result<()> {
    for key in [STREAM_CACHE_KEY, ARTIST_IMAGES_CACHE_KEY] {
        store
            .remove(key)
            .with_context(|| format!("removing {key}"))?;
    }
    tracing::info!("Persisted caches cleared");
    println!("caches cleared");
    Ok(())
}
