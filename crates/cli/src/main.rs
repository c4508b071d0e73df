//! warpgen CLI - Main Entry Point
//!
//! Requests WARP configurations from a running warpgen service, and
//! offers local key generation and allow-list previews.

use clap::{Parser, Subcommand};

use warpgen_cli::client::WarpgenClient;
use warpgen_cli::commands::{generate, keygen, ranges, services};
use warpgen_cli::output::{self, print_error, print_success};

/// warpgen CLI - WARP WireGuard configuration generator
#[derive(Parser)]
#[command(name = "warpgen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// warpgen service address
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "WARPGEN_SERVER", global = true)]
    server: String,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a WireGuard configuration
    Generate(generate::GenerateArgs),

    /// List services known to the server
    Services(services::ServicesArgs),

    /// Generate a key pair locally
    Keygen,

    /// Preview the allow-list for a set of services
    Ranges(ranges::RangesArgs),

    /// Check that the service is up
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Generate(args) => {
            let client = WarpgenClient::new(&cli.server)?;
            generate::execute(args, &client).await?
        }
        Commands::Services(args) => {
            let client = WarpgenClient::new(&cli.server)?;
            services::execute(args, &client, cli.format).await?
        }
        Commands::Keygen => keygen::execute(cli.format)?,
        Commands::Ranges(args) => ranges::execute(args, cli.format)?,
        Commands::Health => {
            let client = WarpgenClient::new(&cli.server)?;
            match client.health().await {
                Ok(health) => {
                    print_success(&format!(
                        "{} is {} at {}",
                        health.service, health.status, cli.server
                    ));
                }
                Err(e) => {
                    print_error(&format!("Service is not responding at {}: {:#}", cli.server, e));
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
