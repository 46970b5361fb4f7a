//! PeerChat CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - built-in defaults
//! - `peerchat.toml` in the working directory
//! - an explicit `--config` file
//! - environment variables (`PEERCHAT_*`, nested keys split on `__`)
//! - command line overrides

use std::path::Path;
use std::str::FromStr;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use peerchat_core::{ChatConfig, PeerId, SessionContext};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Password used when none is configured. Every peer that falls back to it
/// can read every other such peer's messages.
pub const DEFAULT_SECRET: &str = "default_password";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the PeerChat CLI application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliAppConfig {
    /// Session layer configuration from peerchat-core
    pub core: ChatConfig,

    /// Application identity configuration
    pub identity: IdentityConfig,
}

/// Identity and credential configuration
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Fixed peer ID; a random one is generated when unset
    pub peer_id: Option<String>,

    /// Shared password for the session cipher and the connection gate
    pub secret: Option<String>,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("peer_id", &self.peer_id)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl CliAppConfig {
    /// Load configuration from the standard sources plus an optional file
    pub fn load(path: Option<&str>, peer_id: Option<String>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("peerchat.toml"));
        if let Some(path) = path {
            if !Path::new(path).exists() {
                return Err(ConfigError::Loading(format!(
                    "Configuration file not found: {}",
                    path
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("PEERCHAT_").split("__"));

        if let Some(pid) = peer_id {
            figment = figment.merge(("identity.peer_id", pid));
        }

        Self::from_figment(figment)
    }

    /// Extract and validate a configuration from an assembled figment
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: CliAppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref peer_id) = self.identity.peer_id {
            PeerId::from_str(peer_id)
                .map_err(|e| ConfigError::Validation(format!("Invalid peer ID: {}", e)))?;
        }
        if matches!(self.identity.secret.as_deref(), Some(s) if s.is_empty()) {
            return Err(ConfigError::Validation(
                "Secret must not be empty; omit it to use the default".to_string(),
            ));
        }
        self.core
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// The configured peer ID, or a fresh random one
    pub fn peer_id(&self) -> Result<PeerId, ConfigError> {
        match &self.identity.peer_id {
            Some(peer_id) => PeerId::from_str(peer_id)
                .map_err(|e| ConfigError::Validation(format!("Invalid peer ID: {}", e))),
            None => Ok(PeerId::generate()),
        }
    }

    /// The configured secret, falling back to the shared default
    pub fn secret(&self) -> String {
        match &self.identity.secret {
            Some(secret) => secret.clone(),
            None => {
                warn!("No secret configured, using the default password; anyone else using it can read your messages");
                DEFAULT_SECRET.to_string()
            }
        }
    }

    /// Identity and credential for a runtime
    pub fn session_context(&self) -> Result<SessionContext, ConfigError> {
        Ok(SessionContext::new(self.peer_id()?, self.secret()))
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example_config = CliAppConfig {
            identity: IdentityConfig {
                peer_id: Some("my-peer".to_string()),
                secret: Some("correct horse battery staple".to_string()),
            },
            ..Default::default()
        };

        toml::to_string_pretty(&example_config)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
