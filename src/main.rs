use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use reqwest::Client;
use tokio_util::task::TaskTracker;

mod config;
mod db;
mod embeddings;
mod media;
mod models;
mod notifications;
mod observability;
mod pipeline;
mod queue;
mod routes;
mod search;

use embeddings::DualEmbedder;
use notifications::NotificationService;
use pipeline::PipelineService;
use queue::QueueManager;
use search::SearchService;

/// CLI arguments for the Lectern media pipeline.
#[derive(Parser, Debug)]
#[command(version, about = "Lectern media processing pipeline", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to lectern.toml in the working
    /// directory)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the pipeline server (default)
    Serve,
    /// Run database migrations and exit
    ///
    /// Useful for Kubernetes init containers or CI/CD pipelines.
    Migrate,
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to lectern.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn default_config_toml() -> &'static str {
    r#"# Lectern media pipeline configuration.
# Values of the form ${VAR} are expanded from the environment at load time.

[server]
host = "127.0.0.1"
port = 8080
# Public URL the queue provider uses to reach step callbacks.
# public_base_url = "https://pipeline.example.com"

[database]
path = "lectern.db"

[queue]
# token = "${QSTASH_TOKEN}"

# External media services (point these at your deployments)
# [media]
# compressor_url = "http://compressor.internal:9000"
# audio_url = "http://audio.internal:9001"
# transcriber_url = "http://transcriber.internal:9002"

# Embedding backends
# [embeddings.recall]
# url = "http://embed-small.internal:9100"
# dimensions = 384
#
# [embeddings.rerank]
# url = "http://embed-large.internal:9101"
# dimensions = 1024
"#
}

#[derive(Clone)]
pub struct AppState {
    pub http_client: Client,
    pub config: Arc<config::PipelineConfig>,
    pub db: Arc<db::DbPool>,
    pub queue: QueueManager,
    pub pipeline: Arc<PipelineService>,
    pub search: Arc<SearchService>,
    pub embedder: DualEmbedder,
    /// Tracks background tasks so graceful shutdown can wait for them.
    pub task_tracker: TaskTracker,
}

impl AppState {
    pub async fn new(config: config::PipelineConfig) -> Result<Self, Box<dyn std::error::Error>> {
        // One shared client; reqwest keeps per-host connection pools.
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.server.http_timeout_secs))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        let pool = db::DbPool::from_config(&config.database).await?;
        if config.database.run_migrations {
            pool.run_migrations().await?;
        }
        let db = Arc::new(pool);

        let queue = QueueManager::new(http_client.clone(), &config.queue);
        let embedder = DualEmbedder::new(http_client.clone(), &config.embeddings);
        let media: Arc<dyn media::MediaBackend> = Arc::new(media::HttpMediaBackend::new(
            http_client.clone(),
            config.media.clone(),
        ));
        let notifier = NotificationService::new(Arc::clone(&db));

        let pipeline = Arc::new(PipelineService::new(
            Arc::clone(&db),
            queue.clone(),
            media,
            embedder.clone(),
            notifier,
            config.queue.clone(),
            config.server.callback_base_url(),
        ));
        let search = Arc::new(SearchService::new(
            Arc::clone(&db),
            config.search.clone(),
            config.embeddings.recall.dimensions,
            config.embeddings.rerank.dimensions,
        ));

        Ok(Self {
            http_client,
            config: Arc::new(config),
            db,
            queue,
            pipeline,
            search,
            embedder,
            task_tracker: TaskTracker::new(),
        })
    }
}

/// In-memory state wired to a mock queue provider, for route tests.
#[cfg(test)]
pub async fn build_state_for_tests(queue_base_url: &str) -> AppState {
    let mut config = config::PipelineConfig::default();
    config.database.path = ":memory:".to_string();
    config.database.max_connections = 1;
    config.database.wal_mode = false;
    config.queue.base_url = queue_base_url.to_string();
    config.queue.token = "test-token".to_string();
    AppState::new(config).await.expect("test state")
}

fn load_config(explicit: Option<&str>) -> config::PipelineConfig {
    let path = explicit
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("lectern.toml"));
    if !path.exists() && explicit.is_none() {
        // Zero-config startup: defaults plus environment variables.
        return config::PipelineConfig::default();
    }
    match config::PipelineConfig::from_file(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => {
            run_init(output, force);
        }
        Some(Command::Migrate) => {
            run_migrate(args.config.as_deref()).await;
        }
        Some(Command::Serve) | None => {
            run_server(args.config.as_deref()).await;
        }
    }
}

fn run_init(output: Option<String>, force: bool) {
    let path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("lectern.toml"));
    if path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            path.display()
        );
        std::process::exit(1);
    }
    if let Err(e) = std::fs::write(&path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }
    println!("Created config file: {}", path.display());
    println!();
    println!("To start the pipeline, run:");
    println!("  lectern serve --config {}", path.display());
}

async fn run_migrate(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    let pool = match db::DbPool::from_config(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = pool.run_migrations().await {
        eprintln!("Migration failed: {}", e);
        std::process::exit(1);
    }
    println!("Migrations applied");
}

async fn run_server(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);

    observability::init_tracing(&config.logging).expect("Failed to initialize tracing");

    // Without a provider token no step callback can ever be enqueued,
    // so refuse to start rather than fail on the first upload.
    if config.queue.token.is_empty() {
        tracing::error!(
            "No queue provider token configured. Set queue.token in the config file \
             (e.g. token = \"${{QSTASH_TOKEN}}\")."
        );
        std::process::exit(1);
    }
    if config.media.compressor_url.is_none() {
        tracing::warn!(
            "No media services configured; step callbacks will fail until [media] URLs are set"
        );
    }

    let state = match AppState::new(config).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };
    let config = Arc::clone(&state.config);

    if config.embeddings.queue.enabled {
        state.task_tracker.spawn(embeddings::start_embedding_worker(
            Arc::clone(&state.db),
            state.embedder.clone(),
            config.embeddings.queue.clone(),
        ));
    }

    let task_tracker = state.task_tracker.clone();
    let app = routes::build_router(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(task_tracker))
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn shutdown_signal(task_tracker: TaskTracker) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, waiting for background tasks to complete...");
    task_tracker.close();

    let wait_result =
        tokio::time::timeout(std::time::Duration::from_secs(30), task_tracker.wait()).await;
    match wait_result {
        Ok(()) => tracing::info!("All background tasks completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for background tasks, some may not have completed")
        }
    }

    tracing::info!("Shutdown complete");
}
