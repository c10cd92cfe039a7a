use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{DEFAULT_BUFFER_CAPACITY, DEFAULT_LISTEN_ADDRESS, DEFAULT_LISTEN_PORT};
use crate::metrics::{DEFAULT_LINK_CAPACITY_BPS, DEFAULT_WINDOW_SECONDS};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bind a UDP socket and report traffic rates as datagrams arrive
    Listen(Listen),
    /// Feed a recorded event fixture through the rate estimator
    Replay(Replay),
}

#[derive(Parser, Clone, Debug)]
pub struct Listen {
    /// Local address to bind
    #[arg(long, default_value = DEFAULT_LISTEN_ADDRESS)]
    pub address: IpAddr,

    /// UDP port to bind
    #[arg(long, default_value_t = DEFAULT_LISTEN_PORT)]
    pub port: u16,

    #[command(flatten)]
    pub rate: RateArgs,

    /// Give up a receive after this many milliseconds and check for shutdown (blocks forever if omitted)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Append every received datagram to this fixture file
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Show the terminal dashboard instead of console lines
    #[arg(long)]
    pub ui: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct Replay {
    /// Fixture file written by `listen --record`
    pub fixture: PathBuf,

    #[command(flatten)]
    pub rate: RateArgs,
}

#[derive(Args, Clone, Debug)]
pub struct RateArgs {
    /// Histogram window width in seconds
    #[arg(long, default_value_t = DEFAULT_WINDOW_SECONDS)]
    pub window: usize,

    /// Receive buffer capacity in bytes; longer datagrams are truncated
    #[arg(long, default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub buffer: usize,

    /// Nominal link capacity in bits per second
    #[arg(long, default_value_t = DEFAULT_LINK_CAPACITY_BPS)]
    pub link_capacity: u64,

    /// Console output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Payload lines plus a status line rewritten in place
    Text,
    /// One JSON object per line
    Json,
}
