//! Command-line interface
//!
//! `serve` runs the relay; `client` is a small terminal client that sends
//! each stdin line as an envelope and prints everything it receives.

use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server.
    Serve(ServeArgs),
    /// Connect to a relay and exchange messages from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to bind. Overrides WS_RELAY_LISTEN.
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// WebSocket endpoint path. Overrides WS_RELAY_PATH.
    #[arg(long)]
    pub path: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Relay URL. Overrides WS_RELAY_URL.
    #[arg(long)]
    pub url: Option<String>,

    /// Envelope type used for lines read from stdin.
    #[arg(long = "type", default_value = "chat")]
    pub kind: String,

    /// Give up after this many consecutive failed reconnects.
    #[arg(long)]
    pub max_attempts: Option<u32>,
}
