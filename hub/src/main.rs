//! Thin binary entry point: load configuration, open the store, wire the router, the intake loop
//! and the websocket accept loop together, and shut down gracefully on `ctrl_c`.

use hub::{router::Hub, run_intake, server, transport::{FileTailTransport, VecTransport}};
use hub_core::{config::HubConfig, logging, registry::SubscriptionRegistry, store::RocksStore};
use hub_integration::protocol::ConnectionHandle;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("HUB_LOG_FORMAT").as_deref() == Ok("json") {
        logging::init_json_logging();
    } else {
        logging::init_logging();
    }

    let config = load_config()?;
    info!(bind = %config.websocket_bind, store = %config.store_path, "starting hub");

    let store = Arc::new(RocksStore::open(&config.store_path)?);
    let registry = Arc::new(SubscriptionRegistry::<ConnectionHandle>::new());
    let (mut hub, start_offset) = Hub::resume(store, registry, config.history, config.start_offset)?;

    let listener = TcpListener::bind(&config.websocket_bind).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let handles = hub.handles();

    let server_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(server::serve(listener, handles, server_shutdown));

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received ctrl_c, shutting down");
        shutdown_tx.send(()).ok();
    });

    let intake_result = match config.upstream {
        hub_core::config::UpstreamSource::FileTail { directory } => {
            let mut transport = FileTailTransport::new(directory);
            run_intake(&mut hub, &mut transport, start_offset, shutdown_rx.clone()).await
        }
        hub_core::config::UpstreamSource::LogTopic { address } => {
            error!(address, "log-topic upstream source has no transport implementation in this build; running with an empty feed");
            let mut transport = VecTransport::default();
            run_intake(&mut hub, &mut transport, start_offset, shutdown_rx.clone()).await
        }
    };

    if let Err(err) = intake_result {
        error!(%err, "intake loop exited with an error");
    }
    server_task.await??;
    Ok(())
}

fn load_config() -> Result<HubConfig, Box<dyn std::error::Error>> {
    let path = std::env::var("HUB_CONFIG").unwrap_or_else(|_| "hub.toml".to_string());
    let config = match std::fs::read_to_string(&path) {
        Ok(contents) if path.ends_with(".json") => HubConfig::from_json_str(&contents)?,
        Ok(contents) => HubConfig::from_toml_str(&contents)?,
        Err(_) => HubConfig {
            websocket_bind: "0.0.0.0:8765".to_string(),
            store_path: "./hub-db".to_string(),
            upstream: hub_core::config::UpstreamSource::FileTail { directory: "./blocks".to_string() },
            start_offset: 0,
            history: hub_core::config::HistoryConfig::default(),
        },
    };
    Ok(config.apply_env_overrides())
}
