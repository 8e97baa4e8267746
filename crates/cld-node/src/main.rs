use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use cld_state::Cluster;
use cld_storage::fjall::FjallBackend;
use cld_storage::mem::MemBackend;
use cld_storage::Backend;

#[derive(clap::Parser, Debug)]
#[command(name = "clusterd", about = "Cluster control-plane store and Terraform state backend")]
struct Cli {
    /// Name of this cluster member; overrides `member.name`.
    #[arg(long)]
    member: Option<String>,
    /// Overrides `server.listen_addr`.
    #[arg(long)]
    listen_addr: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `storage.data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct MemberConfig {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    listen_addr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StorageBackend {
    Memory,
    Fjall,
}

#[derive(Debug, Deserialize)]
struct StorageConfig {
    backend: StorageBackend,
    data_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    log_level: String,
    log_format: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    member: MemberConfig,
    server: ServerConfig,
    storage: StorageConfig,
    observability: ObservabilityConfig,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut figment = Figment::new()
        .merge(Toml::string(include_str!("../../../config/default.toml")));

    if let Some(config_path) = path {
        figment = figment.merge(Toml::file_exact(config_path));
    }

    figment
        .merge(Env::prefixed("CLUSTERD_").split("__"))
        .extract()
        .context("failed to load configuration")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

async fn run<B: Backend>(backend: B, member: String, addr: SocketAddr) -> anyhow::Result<()> {
    let cluster = Arc::new(Cluster::new(backend, member));
    cld_server::serve(addr, cluster, shutdown_signal()).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(member) = cli.member {
        config.member.name = member;
    }
    if let Some(listen_addr) = cli.listen_addr {
        config.server.listen_addr = listen_addr;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    match config.observability.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
    }

    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen_addr: {}", config.server.listen_addr))?;

    tracing::info!(
        member = %config.member.name,
        %addr,
        backend = ?config.storage.backend,
        data_dir = %config.storage.data_dir.display(),
        "clusterd starting"
    );

    match config.storage.backend {
        StorageBackend::Memory => run(MemBackend::new(), config.member.name, addr).await,
        StorageBackend::Fjall => {
            let data_dir = &config.storage.data_dir;
            std::fs::create_dir_all(data_dir)
                .with_context(|| format!("failed to create data_dir {}", data_dir.display()))?;
            let backend = FjallBackend::open(data_dir)
                .with_context(|| format!("failed to open store at {}", data_dir.display()))?;
            run(backend, config.member.name, addr).await
        }
    }
}
