use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vidshelf::media::scanner::Scanner;
use vidshelf::media::thumbnail::verify_ffmpeg;
use vidshelf::server::{self, AppState};
use vidshelf::{config, Db, FfmpegFrameExtractor, Reconciler, ThumbnailGenerator};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "vidshelf.toml")]
    config: PathBuf,

    /// Address to listen on (overrides server.bind)
    #[arg(long)]
    bind: Option<String>,

    /// Directories holding the video files (overrides library.video_dirs)
    #[arg(long = "video-dir", env = "VIDEO_DIR", value_delimiter = ',')]
    video_dirs: Vec<PathBuf>,

    /// Directory for generated thumbnails
    #[arg(long, env = "THUMBNAIL_DIR")]
    thumbnail_dir: Option<PathBuf>,

    /// SQLite catalog file
    #[arg(long, env = "DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may carry RUST_LOG as well as the directory settings
    let dotenv_result = dotenv::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    if let Err(e) = dotenv_result {
        if !e.not_found() {
            warn!("Failed to read .env: {}", e);
        }
    }

    let args = Args::parse();
    info!("vidshelf starting...");

    // 0. Load Configuration
    let mut config = config::Config::load(&args.config).unwrap_or_else(|e| {
        warn!("Failed to load {:?}: {}. Using defaults.", args.config, e);
        config::Config::default()
    });
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if !args.video_dirs.is_empty() {
        config.library.video_dirs = args.video_dirs;
    }
    if let Some(dir) = args.thumbnail_dir {
        config.library.thumbnail_dir = dir;
    }
    if let Some(path) = args.database {
        config.database.path = path;
    }
    config.validate()?;

    tokio::fs::create_dir_all(&config.library.thumbnail_dir).await?;

    if let Err(e) = verify_ffmpeg(&config.reconciler.ffmpeg_path).await {
        warn!("{}. Thumbnails will not be generated until it is available.", e);
    }

    // 1. Open the catalog
    let db = Arc::new(Db::new(&config.database.path).await?);
    let config = Arc::new(config);
    info!("Catalog opened at {:?}", config.database.path);

    // 2. Start background reconciliation
    let shutdown = CancellationToken::new();
    let generator = ThumbnailGenerator::new(
        Arc::new(FfmpegFrameExtractor::new(config.reconciler.ffmpeg_path.clone())),
        config.library.thumbnail_dir.clone(),
        Duration::from_secs(config.reconciler.thumbnail_offset_secs),
    );
    let reconciler = Reconciler::new(
        db.clone(),
        Arc::new(generator),
        Scanner::new(config.library.extensions.clone()),
        config.library.video_dirs.clone(),
        config.reconciler.gc_interval(),
    );
    let reconciler_handle = reconciler.start(shutdown.clone());

    // 3. Serve until Ctrl-C
    let state = AppState {
        db: db.clone(),
        config: config.clone(),
    };
    let signal = shutdown.clone();
    let served = server::run_server(state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
        signal.cancel();
    })
    .await;

    shutdown.cancel();
    if let Err(e) = reconciler_handle.await {
        error!("Reconciler task ended abnormally: {}", e);
    }
    db.close().await;
    info!("vidshelf stopped");

    served
}
