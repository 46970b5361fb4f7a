//! Centralized Configuration Management
//!
//! This module consolidates the configuration structures used by the session
//! state machines and the runtime channels. All durations are stored as
//! millisecond integers so the structures round-trip cleanly through TOML and
//! environment variables.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ChatError, ChatResult};

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Configuration for CSP channel buffer sizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for Command channels (UI → Core Logic)
    pub command_buffer_size: usize,
    /// Buffer size for Event channels (Transport → Core Logic)
    pub event_buffer_size: usize,
    /// Buffer size for Effect channels (Core Logic → Transport)
    pub effect_buffer_size: usize,
    /// Buffer size for AppEvent channels (Core Logic → UI)
    pub app_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,   // UI commands are infrequent
            event_buffer_size: 128,    // Inbound data can be bursty
            effect_buffer_size: 64,    // Effects are processed quickly
            app_event_buffer_size: 64, // UI updates need responsiveness
        }
    }
}

impl ChannelConfig {
    /// Create configuration for low-memory environments
    pub fn low_memory() -> Self {
        Self {
            command_buffer_size: 10,
            event_buffer_size: 25,
            effect_buffer_size: 25,
            app_event_buffer_size: 50,
        }
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
            event_buffer_size: 100,
            effect_buffer_size: 100,
            app_event_buffer_size: 256,
        }
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Configuration for the connection lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bounded wait for an outbound connection to open
    pub connect_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// ----------------------------------------------------------------------------
// Presence Configuration
// ----------------------------------------------------------------------------

/// Configuration for the typing indicator sub-protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Inactivity after which local typing is reported as stopped
    pub typing_idle_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            typing_idle_ms: 2_000,
        }
    }
}

// ----------------------------------------------------------------------------
// Outbox Configuration
// ----------------------------------------------------------------------------

/// Configuration for pending outbound messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// How long a message must be held before it is deleted
    pub cancel_hold_ms: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            cancel_hold_ms: 1_000,
        }
    }
}

// ----------------------------------------------------------------------------
// Reconnect Configuration
// ----------------------------------------------------------------------------

/// Configuration for signaling reconnection and identity re-acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before reconnecting after the signaling link drops
    pub reconnect_delay_ms: u64,
    /// Delay before retrying with a fresh identity after a collision
    pub identity_retry_delay_ms: u64,
    /// Consecutive attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5_000,
            identity_retry_delay_ms: 2_000,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Bounded retry policy
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }
}

// ----------------------------------------------------------------------------
// Media Configuration
// ----------------------------------------------------------------------------

/// Limits applied to files and recordings before they are sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Largest accepted file in bytes
    pub max_file_bytes: usize,
    /// MIME type prefixes accepted for file sends
    pub allowed_type_prefixes: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 5 * 1024 * 1024,
            allowed_type_prefixes: vec!["image/".to_string(), "video/".to_string()],
        }
    }
}

// ----------------------------------------------------------------------------
// Aggregate Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for one chat peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub session: SessionConfig,
    pub presence: PresenceConfig,
    pub outbox: OutboxConfig,
    pub reconnect: ReconnectConfig,
    pub media: MediaConfig,
    pub channels: ChannelConfig,
}

impl ChatConfig {
    /// Configuration with large channel buffers for tests
    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            ..Self::default()
        }
    }

    /// Reject configurations the state machines cannot run with
    pub fn validate(&self) -> ChatResult<()> {
        if self.session.connect_timeout_ms == 0 {
            return Err(ChatError::config_error(
                "Connect timeout must be greater than 0",
            ));
        }
        if self.presence.typing_idle_ms == 0 {
            return Err(ChatError::config_error(
                "Typing idle timeout must be greater than 0",
            ));
        }
        if self.outbox.cancel_hold_ms == 0 {
            return Err(ChatError::config_error(
                "Cancel hold duration must be greater than 0",
            ));
        }
        if self.reconnect.max_attempts == Some(0) {
            return Err(ChatError::config_error(
                "Reconnect attempts must be at least 1 when bounded",
            ));
        }
        if self.media.max_file_bytes == 0 {
            return Err(ChatError::config_error(
                "Maximum file size must be greater than 0",
            ));
        }
        let channels = &self.channels;
        if channels.command_buffer_size == 0
            || channels.event_buffer_size == 0
            || channels.effect_buffer_size == 0
            || channels.app_event_buffer_size == 0
        {
            return Err(ChatError::config_error(
                "Channel buffer sizes must be greater than 0",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
