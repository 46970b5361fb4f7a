//! PeerChat CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::info;

use peerchat_cli::{Cli, CliAppConfig, CommandDispatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = CliAppConfig::load(cli.config.as_deref(), cli.peer_id.clone())
        .context("Could not load configuration")?;

    CommandDispatcher::execute(cli, config)
        .await
        .context("Command execution failed")?;

    info!("PeerChat CLI exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
