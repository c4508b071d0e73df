//! warpgen web service

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use warpgen_web::{WarpgenConfig, WebServer};

#[derive(Parser)]
#[command(name = "warpgen-web")]
#[command(about = "WARP WireGuard configuration generator service")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "warpgen.toml", env = "WARPGEN_CONFIG")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("warpgen-web v{}", warpgen_common::VERSION);

    let mut config = WarpgenConfig::load(&cli.config)?;
    config.apply_env()?;
    config.validate()?;

    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address {:?}: {}", config.listen, e))?;

    info!(
        "Registration API {}, QR backend {:?}",
        config.registration.base_url(),
        config.qr.backend
    );

    let server = WebServer::from_config(&config)?;
    server.serve(addr).await
}
