mod api;
mod config;
mod registration;

use std::sync::Arc;

use anyhow::Context;
use envoyshim_core::{Discovery, MemoryRegistry, Registrar, RegistryStore};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::Config;
use crate::registration::CountingRegistrar;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("envoyshim server starting up");

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).ok();

    let config = Config::from_env()?;
    tracing::info!(
        socket = %config.socket_path.display(),
        api = %config.api_addr,
        "configuration loaded"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    run(config, Some(handle), shutdown).await
}

/// Runs the registration channel and the discovery API until `shutdown`
/// fires or either side fails. The channel socket is removed on every exit
/// path once it has been bound.
async fn run(
    config: Config,
    metrics: Option<PrometheusHandle>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let store: Arc<dyn RegistryStore> = Arc::new(MemoryRegistry::new());
    let registrar = Registrar::new(store.clone());
    let discovery = Discovery::new(store);

    let socket = envoyshim_wire::bind(&config.socket_path)
        .with_context(|| format!("failed to listen on {}", config.socket_path.display()))?;
    let channel = tokio::spawn(envoyshim_wire::serve(
        socket,
        Arc::new(CountingRegistrar::new(registrar)),
        shutdown.clone(),
    ));

    let served = serve_api(&config, AppState { discovery, metrics }, &shutdown).await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "discovery API stopped");
        shutdown.cancel();
    }

    channel.await.ok();
    remove_socket(&config)?;
    served
}

async fn serve_api(
    config: &Config,
    state: AppState,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.api_addr)
        .await
        .with_context(|| format!("can't start envoy xDS API server on {}", config.api_addr))?;
    tracing::info!(addr = %config.api_addr, "discovery API listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .context("discovery API server failed")
}

fn remove_socket(config: &Config) -> anyhow::Result<()> {
    match std::fs::remove_file(&config.socket_path) {
        Ok(()) => {
            tracing::info!(path = %config.socket_path.display(), "removed registration socket");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| {
            format!("unable to remove socket {}", config.socket_path.display())
        }),
    }
}

async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
    shutdown.cancel();
}
