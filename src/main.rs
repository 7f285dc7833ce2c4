use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use roombook::compactor;
use roombook::engine::Engine;
use roombook::seed::Seed;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let metrics_port: Option<u16> = env_parse("ROOMBOOK_METRICS_PORT");
    roombook::observability::init(metrics_port)?;

    let data_dir = std::env::var("ROOMBOOK_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let seed_file = std::env::var("ROOMBOOK_SEED_FILE").ok();
    let compact_threshold: u64 = env_parse("ROOMBOOK_COMPACT_THRESHOLD").unwrap_or(1000);
    let compact_every = Duration::from_secs(env_parse("ROOMBOOK_COMPACT_INTERVAL_SECS").unwrap_or(60));

    std::fs::create_dir_all(&data_dir)?;
    let wal_path = PathBuf::from(&data_dir).join("roombook.wal");
    let engine = Arc::new(Engine::open(&wal_path)?);

    info!("roombook started");
    info!("  wal: {}", wal_path.display());
    info!("  compaction: every {compact_every:?} past {compact_threshold} appends");
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    if let Some(path) = seed_file {
        if engine.is_empty() {
            let created = Seed::load(Path::new(&path))?.apply(&engine).await?;
            info!("seeded {created} records from {path}");
        } else {
            info!("store not empty, seed file {path} ignored");
        }
    }

    let compactor_engine = engine.clone();
    let compactor_task = tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, compact_threshold, compact_every).await;
    });

    shutdown_signal().await;
    info!("shutdown signal received");
    compactor_task.abort();
    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("roombook stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
