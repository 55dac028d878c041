//! chat-server - multi-user TCP chat relay
//!
//! Accepts clients, relays broadcast and direct messages, and serves the
//! files in a shared directory for download.

use anyhow::{Context, Result};
use chatrelay::config::{parse_size, ServerConfig};
use chatrelay::server::ChatServer;
use clap::Parser;
use std::fs::OpenOptions;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Multi-user TCP chat relay with file downloads
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (default 5050)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (default 0.0.0.0)
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Directory of files offered for download (default ./download)
    #[arg(short, long)]
    files: Option<PathBuf>,

    /// Transfer chunk size, e.g. 64KB or 1MB
    #[arg(long)]
    chunk_size: Option<String>,

    /// JSON config file; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also append log output to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.log_file.as_ref())?;

    let config = build_config(&args)?;
    let server = ChatServer::bind(config)
        .await
        .context("Failed to start server")?;

    println!("Listening on: {}", server.local_addr()?);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };

    let ip = args.bind.unwrap_or_else(|| config.listen_addr.ip());
    let port = args.port.unwrap_or_else(|| config.listen_addr.port());
    config = config.with_listen_addr(SocketAddr::new(ip, port));

    if let Some(files) = &args.files {
        config = config.with_files_dir(files);
    }
    if let Some(size) = &args.chunk_size {
        config = config.with_chunk_size(parse_size(size)?);
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(debug: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let log_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chat_server={0},chatrelay={0}", log_level)));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    Ok(())
}
