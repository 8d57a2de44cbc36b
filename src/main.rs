use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::oneshot;

use vitalsync::analysis::{HuggingFaceProvider, LlmProvider};
use vitalsync::api;
use vitalsync::config::{load_config, StoreBackend};
use vitalsync::logging::init_logging;
use vitalsync::records::{HISTORY_TABLE, PATIENTS_TABLE};
use vitalsync::storage::{MemoryStore, PostgrestStore, RecordStore};
use vitalsync::vitals::VitalsLayout;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config_path = std::env::var("VITALSYNC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yaml"));
    let config = load_config(&config_path)?;

    init_logging(&config.logging.level)?;
    tracing::info!(config = %config_path.display(), backend = ?config.store.backend, "starting vitalsync");

    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Rest => {
            let url = config.store.url.as_deref().unwrap_or_default();
            let key = config.store.key.as_deref().unwrap_or_default();
            Arc::new(PostgrestStore::new(
                url,
                key,
                Duration::from_secs(config.store.timeout_secs),
            )?)
        }
        StoreBackend::Memory => {
            let mut tables = vec![
                PATIENTS_TABLE.to_string(),
                HISTORY_TABLE.to_string(),
                config.vitals.flat_table.clone(),
            ];
            tables.extend((1..=config.vitals.depth).map(|slot| format!("{}{}", config.vitals.slot_prefix, slot)));
            Arc::new(MemoryStore::with_tables(tables))
        }
    };

    let layout = VitalsLayout::resolve(&config.vitals, store.as_ref()).await;

    if config.inference.token.is_none() {
        tracing::warn!("HF_TOKEN is not set; analysis requests will fail");
    }
    let provider: Arc<dyn LlmProvider> = Arc::new(HuggingFaceProvider::new(&config.inference)?);

    let api = api::assemble(Arc::clone(&store), layout, config.vitals.scope, provider);

    let host: IpAddr = config.api.host.parse()?;
    let addr = SocketAddr::new(host, config.api.port);
    tracing::info!(%addr, "starting server");

    // Create a channel for shutdown signal
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let (_, server) = warp::serve(api.routes())
        .bind_with_graceful_shutdown(addr, async move {
            shutdown_rx.await.ok();
            tracing::info!("shutting down server");
        });

    let server_handle = tokio::spawn(server);

    signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, starting graceful shutdown");

    shutdown_tx.send(()).ok();
    server_handle.await?;

    tracing::info!("server shutdown complete");
    Ok(())
}
