//! Command-line definition

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "upmux")]
#[command(about = "Connect to upstream MCP servers and report their status")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to every configured upstream, print its status, disconnect
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Servers file in `{"mcpServers": {...}}` form
    #[arg(short = 'c', long = "config", env = "UPMUX_SERVERS_FILE")]
    pub config: PathBuf,

    /// Rewrite localhost upstream URLs to the Docker host alias
    #[arg(long)]
    pub docker: bool,

    /// Per-attempt connect timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}
