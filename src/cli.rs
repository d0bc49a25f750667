//! Command line interface for the `chatgate` demo binary.
//!
//! Connects one identity, joins rooms, prints every event as a JSON line and
//! sends stdin lines to the first room.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `chatgate` binary.
#[derive(Debug, Parser)]
#[command(name = "chatgate", version, about = "Bridge a chat server to JSON events")]
pub struct Cli {
    /// Nick to register.
    #[arg(short, long)]
    pub nick: String,
    /// Server host name.
    #[arg(short, long)]
    pub server: String,
    /// Server port; defaults to 6697 with --secure and 6667 otherwise.
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Connect over TLS.
    #[arg(long)]
    pub secure: bool,
    /// Real name sent during registration.
    #[arg(long)]
    pub real_name: Option<String>,
    /// Connection password, or the account password with --sasl.
    #[arg(long)]
    pub password: Option<String>,
    /// Authenticate with SASL PLAIN.
    #[arg(long, requires = "password")]
    pub sasl: bool,
    /// Room to join after connecting; repeatable.
    #[arg(short = 'j', long = "join", value_name = "ROOM")]
    pub rooms: Vec<String>,
    /// Maximum outbound lines per second.
    #[arg(long)]
    pub rate: Option<u32>,
    /// Seconds allowed for connecting and registering.
    #[arg(long, default_value_t = 30)]
    pub connect_timeout: u64,
    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
