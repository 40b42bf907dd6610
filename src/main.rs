use anyhow::Context;
use clap::{Parser, ValueEnum};
use revisit_api::{MatchResolver, ResolverConfig, RestApi};
use revisit_similarity::{Scorer, SimilarityConfig};
use revisit_storage::{StorageBackend, StorageManager, DEFAULT_SWEEP_INTERVAL};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Storage {
    /// LMDB under the data directory
    Lmdb,
    /// Volatile, for demos and tests
    Memory,
}

/// Recognise returning visitors from browser fingerprints
#[derive(Parser, Debug)]
#[command(name = "revisit")]
#[command(about = "Returning-visitor recognition service", long_about = None)]
struct Args {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// HTTP API port
    #[arg(long, default_value_t = 3000)]
    http_port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Storage backend
    #[arg(long, value_enum, default_value_t = Storage::Lmdb)]
    storage: Storage,

    /// JSON file replacing the default feature weights
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Minimum score for two fingerprints to be the same visitor
    #[arg(long)]
    match_threshold: Option<f64>,

    /// Lifetime of exact-hash cache entries, in seconds
    #[arg(long, default_value_t = 86_400)]
    cache_ttl_secs: u64,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_similarity_config(args: &Args) -> anyhow::Result<SimilarityConfig> {
    let mut config = match &args.weights {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading weights file {:?}", path))?;
            SimilarityConfig::from_json(&json)?
        }
        None => SimilarityConfig::default(),
    };
    if let Some(threshold) = args.match_threshold {
        config.match_threshold = threshold;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting revisit v{}", env!("CARGO_PKG_VERSION"));

    let scorer = Scorer::new(load_similarity_config(&args)?)?;

    let backend = match args.storage {
        Storage::Lmdb => StorageBackend::Lmdb,
        Storage::Memory => StorageBackend::Memory,
    };
    let storage = StorageManager::with_backend(backend, &args.data_dir)?;
    info!("Storage initialized ({:?}, data directory {:?})", backend, args.data_dir);
    storage.start_cache_sweeper(DEFAULT_SWEEP_INTERVAL);

    let resolver = Arc::new(MatchResolver::from_storage(
        &storage,
        scorer,
        ResolverConfig {
            cache_ttl: Duration::from_secs(args.cache_ttl_secs),
        },
    ));
    let scorer = resolver.scorer();
    info!(
        "Scoring {} features, match threshold {}, policy {:?}",
        scorer.config().features.len(),
        scorer.match_threshold(),
        scorer.config().policy
    );

    let bind = args.bind.clone();
    let http_port = args.http_port;
    let http_handle = std::thread::spawn(move || {
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(resolver, bind, http_port).await {
                tracing::error!("HTTP server error: {}", e);
            }
        })
    });

    info!("revisit started: http://localhost:{}/api/fingerprint", args.http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    storage.stop_cache_sweeper();
    Ok(())
}
