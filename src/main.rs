mod broadcast;
mod chains;
mod manager;
mod order_hash;
mod primitives;
mod quoter;
mod server;
mod settings;
mod ttl_store;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::chains::aptos::AptosChain;
use crate::chains::evm::EvmChain;
use crate::manager::Manager;
use crate::quoter::QuoterClient;
use crate::server::handlers::AppState;
use crate::settings::Settings;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coordinator=info")),
        )
        .try_init();

    let settings = Settings::from_env()?;
    if settings.dev_mode {
        warn!("dev mode enabled: quotes are served from the built-in template");
    }

    let evm = Arc::new(EvmChain::connect(&settings.evm_rpc_url)?);
    let aptos = Arc::new(AptosChain::new(&settings.aptos_rpc_url)?);
    let manager = Arc::new(Manager::new(
        evm,
        aptos,
        Duration::from_secs(settings.quote_ttl_secs),
        Duration::from_secs(settings.release_buffer_secs),
    ));
    let quoter = Arc::new(QuoterClient::new(
        settings.oneinch_url.clone(),
        settings.oneinch_api_key.clone(),
    )?);

    let state = AppState {
        manager: manager.clone(),
        quoter,
        dev_mode: settings.dev_mode,
        outbox_capacity: settings.outbox_capacity,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let rest = tokio::spawn(server::serve(
        server::rest_router(state.clone()),
        settings.api_port,
        shutdown_rx.clone(),
    ));
    let ws = tokio::spawn(server::serve(
        server::ws::router(state),
        settings.ws_port,
        shutdown_rx,
    ));

    shutdown_signal().await;
    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    let drain = async {
        for task in [rest, ws] {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "server exited with error"),
                Err(e) => error!(error = %e, "server task panicked"),
            }
        }
    };
    if tokio::time::timeout(DRAIN_DEADLINE, drain).await.is_err() {
        warn!("drain deadline exceeded, aborting in-flight requests");
    }

    manager.close().await;
    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
