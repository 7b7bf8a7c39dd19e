//! WebSocket Relay - Entry Point
//!
//! `serve` starts the listener and Router actor; `client` runs a terminal
//! client on top of `WsClient`.

use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ws_relay::cli::{Cli, ClientArgs, Command, ServeArgs};
use ws_relay::client::handler;
use ws_relay::message::WILDCARD;
use ws_relay::{ClientConfig, Server, ServerConfig, WsClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=ws_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ws_relay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Client(args) => client(args).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::from_env()?;
    if let Some(listen) = args.listen {
        config = config.with_listen(listen);
    }
    if let Some(path) = args.path {
        config = config.with_path(path);
    }

    let server = Server::bind(config).await?;
    info!("WebSocket Relay bound to {}", server.local_addr()?);
    server.run_until_ctrl_c().await?;
    Ok(())
}

async fn client(args: ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = args.url {
        config = config.with_url(url);
    }
    if let Some(max) = args.max_attempts {
        config = config.with_max_attempts(max);
    }

    let client = WsClient::new(config);

    // Print every inbound envelope as one JSON line
    client.on(
        WILDCARD,
        handler(|envelope| {
            println!("{}", envelope.to_json()?);
            Ok(())
        }),
    );

    if let Err(e) = client.connect().await {
        warn!("Initial connect failed, retrying in background: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    // Lines that parse as JSON are sent as structured data
                    let data = serde_json::from_str(&line).unwrap_or(Value::String(line));
                    client.send(args.kind.as_str(), data);
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect();
    info!("Client stopped");
    Ok(())
}
