use clap::Parser;
use ipstash::{Registry, config::Config, net::server, store::JsonFileStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "ipstash", version, about = "Per-client quota-aware file store over TCP")]
struct Args {
    /// Address to listen on (overrides IPSTASH_LISTEN_ADDR)
    #[arg(long)]
    listen: Option<String>,

    /// Root directory for client namespaces (overrides IPSTASH_DATA_ROOT)
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Path of the JSON client registry (overrides IPSTASH_REGISTRY_PATH)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Quota in bytes for newly seen clients (overrides IPSTASH_DEFAULT_QUOTA)
    #[arg(long)]
    quota: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut cfg = Config::from_env()?;
    if let Some(listen) = args.listen {
        cfg.listen_addr = listen;
    }
    if let Some(root) = args.data_root {
        cfg.data_root = root;
    }
    if let Some(registry) = args.registry {
        cfg.registry_path = registry;
    }
    if let Some(quota) = args.quota {
        cfg.default_quota = quota;
    }
    let cfg = Arc::new(cfg);

    let store = Arc::new(JsonFileStore::new(cfg.registry_path.clone()));
    let registry = Arc::new(Registry::new(store, cfg.clone()));

    let addr: SocketAddr = cfg.listen_addr.parse()?;
    tracing::info!(%addr, root = %cfg.data_root.display(), "ipstash listening");
    server::serve(addr, registry).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, prelude::*};

    color_eyre::install().unwrap();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::uptime()),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();
}
