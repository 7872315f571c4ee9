use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use piano_quiz_sw::config::{Cli, Config, StorageBackend};
use piano_quiz_sw::network::http_client::HttpNetwork;
use piano_quiz_sw::network::scripted::ScriptedNetwork;
use piano_quiz_sw::network::SharedNetwork;
use piano_quiz_sw::server::{build_router, AppState};
use piano_quiz_sw::storage::disk::DiskCacheStorage;
use piano_quiz_sw::storage::memory::MemoryCacheStorage;
use piano_quiz_sw::storage::SharedStorage;
use piano_quiz_sw::worker::service::ServiceWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "piano_quiz_sw=debug,tower_http=debug"
    } else {
        "piano_quiz_sw=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("piano-quiz-sw v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);

    info!(
        scope = %config.worker.scope,
        cache = %config.worker.cache_name,
        backend = ?config.storage.backend,
        offline = cli.offline,
        "Configuration loaded"
    );

    let storage: SharedStorage = match config.storage.backend {
        StorageBackend::Memory => MemoryCacheStorage::shared(),
        StorageBackend::Disk => {
            info!(path = %config.storage.path.display(), "Opening disk cache store");
            DiskCacheStorage::shared(&config.storage).await?
        }
    };

    let network: SharedNetwork = if cli.offline {
        let scripted = ScriptedNetwork::new();
        scripted.set_offline(true);
        Arc::new(scripted)
    } else {
        Arc::new(HttpNetwork::new(&config.network)?)
    };

    // Any cache under another name belongs to an older version.
    let existing = storage.keys().await?;
    let previous_active = existing.iter().any(|name| *name != config.worker.cache_name);

    let worker = ServiceWorker::new(
        Arc::new(config.worker.clone()),
        storage,
        network.clone(),
        previous_active,
    );

    // Resume only when an earlier run finished installing this version.
    if worker.router().is_installed().await? {
        info!(cache = %config.worker.cache_name, "Resuming installed worker");
        worker.resume();
    } else {
        match worker.start().await {
            Ok(report) => info!(
                static_cached = report.static_cached,
                external_cached = report.external_cached,
                state = %worker.state(),
                "Worker started"
            ),
            Err(e) => {
                error!(error = %e, "Worker failed to start, requests will pass through");
            }
        }
    }

    if !worker.state().can_intercept_fetch() {
        warn!(state = %worker.state(), "Worker is not intercepting requests");
    }

    let state = Arc::new(AppState {
        worker,
        network,
        start_time: Instant::now(),
    });

    let app = build_router(state);

    let listen_addr = config.server.listen.clone();
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
