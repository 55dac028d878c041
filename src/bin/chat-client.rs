//! chat-client - terminal client for chat-server
//!
//! Reads commands from stdin and prints server events with a timestamp.
//! Type `/help` for the command list.

use anyhow::{Context, Result};
use chatrelay::client::{ClientEvent, ClientSession, LineOutcome, HELP};
use chatrelay::config::{parse_size, ClientConfig};
use chatrelay::{CommandError, RelayError};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

/// Terminal client for the chat relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Username to register
    username: String,

    /// Server host
    host: String,

    /// Server port
    port: u16,

    /// Root directory for downloads; files land in <DIR>/<username>/
    #[arg(long, default_value = ".")]
    downloads: PathBuf,

    /// Transfer chunk size, e.g. 64KB or 1MB
    #[arg(long, default_value = "64KB")]
    chunk_size: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("chat_client={0},chatrelay={0}", log_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::new(format!("{}:{}", args.host, args.port), &args.username)
        .with_download_root(&args.downloads)
        .with_chunk_size(parse_size(&args.chunk_size)?);

    let (session, events) = ClientSession::connect(config)
        .await
        .context("Failed to connect")?;
    print_line(&format!(
        "Connected to {}:{} as {}. Type /help for commands.",
        args.host, args.port, args.username
    ));

    run(session, events).await
}

async fn run(session: ClientSession, mut events: mpsc::UnboundedReceiver<ClientEvent>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    print_line(&event.to_string());
                    if matches!(event, ClientEvent::Disconnected { .. }) {
                        break;
                    }
                },
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match session.submit_line(&line).await {
                    Ok(LineOutcome::Help) => println!("{}", HELP),
                    Ok(LineOutcome::Renamed(name)) => print_line(&format!("Username changed to {}", name)),
                    Ok(LineOutcome::Deferred) => debug!("Command deferred until rename"),
                    Ok(LineOutcome::Sent) | Ok(LineOutcome::Disconnect) => {},
                    Err(RelayError::Command(CommandError::Empty)) => {},
                    Err(RelayError::Command(e)) => print_line(&e.to_string()),
                    Err(RelayError::Protocol(e)) if session.is_pending_rename() => {
                        print_line(&format!("{}. Enter a new username:", e));
                    },
                    Err(e) => return Err(e.into()),
                },
                None => {
                    stdin_open = false;
                    session.disconnect().await?;
                },
            },
        }
    }

    Ok(())
}

fn print_line(text: &str) {
    println!("[{}] {}", Local::now().format("%H:%M:%S"), text);
}
