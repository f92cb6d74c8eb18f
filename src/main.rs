use std::sync::Arc;

use tracing::info;

use innkeep::compactor;
use innkeep::config::Config;
use innkeep::engine::{Engine, EngineOptions};
use innkeep::store::WalStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    innkeep::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let wal_path = config.wal_path();
    let store = Arc::new(WalStore::open(&wal_path)?);

    let engine = Engine::open(
        store.clone(),
        EngineOptions {
            persist_timeout: config.persist_timeout,
            ..EngineOptions::default()
        },
    )
    .await?;

    info!("innkeep booking core ready");
    info!("  wal: {}", wal_path.display());
    info!("  rooms: {}", engine.room_count());
    info!("  persist_timeout: {:?}", config.persist_timeout);
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let compactor_store = store.clone();
    let threshold = config.compact_threshold;
    let every = config.compact_interval;
    let compactor_task = tokio::spawn(async move {
        compactor::run_compactor(compactor_store, threshold, every).await;
    });

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received");
    compactor_task.abort();
    compactor::compact_if_needed(&store, 1).await;
    info!("innkeep stopped");
    Ok(())
}
