//! Error handling for the PeerChat CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("PeerChat error: {0}")]
    Chat(#[from] peerchat_core::ChatError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Demo failed: {0}")]
    Demo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Demo(err.to_string())
    }
}
