//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the local peer ID
    #[arg(long)]
    pub peer_id: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run two peers over an in-process network and exchange a message
    Demo {
        /// Password of the local peer (defaults to the configured one)
        #[arg(short, long)]
        secret: Option<String>,
        /// Password of the friend peer (defaults to the local one)
        #[arg(short, long)]
        remote_secret: Option<String>,
        /// Message the local peer sends once connected
        #[arg(short, long, default_value = "hello")]
        message: String,
    },
    /// Print an example configuration file
    Config {
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Show the peer ID this configuration would use
    Id,
}
