use std::net::SocketAddr;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use envoyshim_core::envoy::{ClusterDocument, ListenerDocument, ServiceDocument};
use envoyshim_core::{Action, RegistrationRequest, RetryPolicy};
use envoyshim_wire::{DEFAULT_SOCKET_PATH, RegistrarClient};
use serde::Deserialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "envoyshim-ctl")]
#[command(about = "Inspect and poke an envoyshim server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Discovery API base URL
    #[arg(long, env = "SHIM_API_URL", default_value = "http://127.0.0.1:7776")]
    api: String,

    /// Registration channel socket
    #[arg(long, env = "SHIM_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
    socket: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List the clusters Envoy would see
    Clusters,
    /// List the listeners Envoy would see
    Listeners,
    /// Show the hosts registered for a service
    Service { name: String },
    /// Register an endpoint by hand
    Register(EndpointArgs),
    /// Remove an endpoint by hand
    Deregister(EndpointArgs),
}

#[derive(clap::Args)]
struct EndpointArgs {
    #[arg(long)]
    frontend: SocketAddr,
    #[arg(long)]
    backend: SocketAddr,
    #[arg(long)]
    service: String,
    #[arg(long)]
    env: String,
    #[arg(long, default_value = "http")]
    mode: String,
}

impl EndpointArgs {
    fn request(self, action: Action) -> RegistrationRequest {
        RegistrationRequest::new(
            self.frontend,
            self.backend,
            self.service,
            self.env,
            self.mode,
        )
        .with_action(action)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let api = cli.api.trim_end_matches('/').to_string();
    let http = reqwest::Client::new();

    match cli.command {
        Commands::Clusters => {
            let doc: ClusterDocument = get_json(&http, &format!("{api}/v1/clusters")).await?;
            print_lines(&cluster_lines(&doc));
        }
        Commands::Listeners => {
            let doc: ListenerDocument = get_json(&http, &format!("{api}/v1/listeners")).await?;
            print_lines(&listener_lines(&doc));
        }
        Commands::Service { name } => {
            let url = format!("{api}/v1/registration/{name}");
            let resp = http
                .get(&url)
                .send()
                .await
                .with_context(|| format!("request to {url} failed"))?;
            if !resp.status().is_success() {
                let status = resp.status();
                let message = resp
                    .json::<ErrorBody>()
                    .await
                    .map(|body| body.message)
                    .unwrap_or_else(|_| status.to_string());
                bail!("{message}");
            }
            let doc: ServiceDocument = resp.json().await.context("bad service document")?;
            print_lines(&service_lines(&doc));
        }
        Commands::Register(args) => {
            call(&cli.socket, args.request(Action::Register)).await?;
            println!("Registered");
        }
        Commands::Deregister(args) => {
            call(&cli.socket, args.request(Action::Deregister)).await?;
            println!("Deregistered");
        }
    }

    Ok(())
}

async fn get_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
) -> anyhow::Result<T> {
    let resp = http
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()?;
    resp.json().await.with_context(|| format!("bad document from {url}"))
}

async fn call(socket: &str, req: RegistrationRequest) -> anyhow::Result<()> {
    let client = RegistrarClient::new(envoyshim_wire::socket_path(socket));
    RetryPolicy::default()
        .run(|_| client.register(&req))
        .await
        .with_context(|| format!("{:?} of {} failed", req.action, req.key()))?;
    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

fn cluster_lines(doc: &ClusterDocument) -> Vec<String> {
    let mut lines = vec![
        format!("{:<40} {:<8} {:<12}", "Cluster", "Type", "LB"),
        "-".repeat(62),
    ];
    lines.extend(
        doc.clusters
            .iter()
            .map(|c| format!("{:<40} {:<8} {:<12}", c.name, c.kind, c.lb_type)),
    );
    lines
}

fn listener_lines(doc: &ListenerDocument) -> Vec<String> {
    let mut lines = vec![format!("{:<40} {:<30}", "Listener", "Address"), "-".repeat(70)];
    lines.extend(
        doc.listeners
            .iter()
            .map(|l| format!("{:<40} {:<30}", l.name, l.address)),
    );
    lines
}

fn service_lines(doc: &ServiceDocument) -> Vec<String> {
    let mut lines = vec![
        format!("Service {} ({})", doc.service, doc.env),
        format!("{:<20} {:<8} {:<30}", "Address", "Port", "Last check-in"),
        "-".repeat(60),
    ];
    lines.extend(
        doc.hosts
            .iter()
            .map(|h| format!("{:<20} {:<8} {:<30}", h.ip_address, h.port, h.last_check_in)),
    );
    lines
}
