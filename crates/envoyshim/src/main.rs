use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use envoyshim::parent::ParentPipe;
use envoyshim::{Cli, DockerClient, Proxy, ProxyOptions, ShimError, cli};
use envoyshim_wire::RegistrarClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    // Has to come first: descriptor 3 is only ours until something else opens a file.
    let parent = ParentPipe::take();

    dotenvy::dotenv().ok();
    let cli = match Cli::try_parse_from(cli::normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            if let Some(parent) = parent {
                parent.report(Err(e.to_string()));
            }
            e.exit();
        }
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "can't start the async runtime");
            if let Some(parent) = parent {
                parent.report(Err(e));
            }
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(cli, parent))
}

async fn run(cli: Cli, parent: Option<ParentPipe>) -> ExitCode {
    let proxy = match setup(&cli).await {
        Ok(proxy) => {
            if let Some(parent) = parent {
                parent.report::<ShimError>(Ok(()));
            }
            proxy
        }
        Err(e) => {
            tracing::error!(error = %e, "proxy setup failed");
            if let Some(parent) = parent {
                parent.report(Err(e));
            }
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        proto = %cli.proto,
        frontend = %proxy.frontend_addr(),
        backend = %proxy.backend_addr(),
        reload = cli.reload,
        "proxy ready"
    );

    let shutdown = CancellationToken::new();
    if !cli.reload {
        tokio::spawn(watch_signals(shutdown.clone()));
    }

    match proxy.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "proxy exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn setup(cli: &Cli) -> Result<Proxy, ShimError> {
    let transport = cli.transport()?;
    let frontend = cli.frontend()?;
    let backend = cli.backend()?;
    let options = ProxyOptions {
        reload: cli.reload,
        client: RegistrarClient::new(envoyshim_wire::socket_path(&cli.socket)),
        discovery: Arc::new(DockerClient::new(&cli.docker_socket)?),
    };
    Proxy::new(transport, frontend, backend, options).await
}

async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

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

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, shutting down");
    shutdown.cancel();
}
