//! Error types for the PeerChat protocol
//!
//! This module contains all error types used throughout the PeerChat core,
//! including transport, credential, session, media and cipher errors, and the
//! main ChatError type that unifies them all. `DecryptFailure` is the odd one
//! out: it is never propagated with `?` but returned as a value so a failed
//! envelope can be rendered as a placeholder.

use serde::{Deserialize, Serialize};

use crate::channel::Severity;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Specific transport error types
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport could not open or keep a connection
    #[error("{reason}")]
    ConnectionFailed { reason: String },
    #[error("Connection timed out")]
    Timeout,
    #[error("Failed to send message: {reason}")]
    SendFailed { reason: String },
}

/// Reasons an inbound connection fails the credential gate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("Rejected connection from {peer_id}: wrong credential")]
    Mismatch { peer_id: String },
    #[error("Rejected connection from {peer_id}: no credential")]
    Missing { peer_id: String },
}

/// Specific session error types
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Already connected to {peer_id}")]
    AlreadyConnected { peer_id: String },
    #[error("Not connected to anyone")]
    NotConnected,
    #[error("Please enter a friend ID")]
    EmptyRemoteId,
    #[error("Invalid peer ID: {peer_id}")]
    InvalidPeerId { peer_id: String },
}

/// Specific media error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("File is too large (max {max_label})")]
    TooLarge {
        size: usize,
        max: usize,
        max_label: String,
    },
    #[error("Unsupported file type. Please send images or videos.")]
    UnsupportedType { mime: String },
    #[error("Recording is empty")]
    EmptyRecording,
    #[error("Microphone access denied")]
    CaptureDenied,
    #[error("Voice recording not supported")]
    CaptureUnsupported,
}

/// Specific cipher error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Ciphertext is not valid: {reason}")]
    InvalidEncoding { reason: String },
}

/// Specific pending outbox error types
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Message {id} is already staged")]
    DuplicateId { id: String },
    #[error("Message {id} is not pending")]
    UnknownId { id: String },
}

/// Why an inbound envelope could not be turned back into a plaintext body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum DecryptFailure {
    /// Authentication failed: wrong secret or corrupted ciphertext
    #[error("Couldn't decrypt (wrong password?)")]
    Unreadable,
    /// Required fields missing or of the wrong shape
    #[error("Malformed envelope: {reason}")]
    Malformed { reason: String },
    /// Decrypted text payload was not UTF-8
    #[error("Decrypted text is not valid UTF-8")]
    InvalidText,
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error types for the PeerChat protocol
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    #[error("Invalid envelope: {reason}")]
    InvalidEnvelope { reason: String },

    /// Channel communication error (internal to CSP architecture)
    #[error("Channel error: {message}")]
    Channel { message: String },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl ChatError {
    /// Create an invalid envelope error with a reason
    pub fn invalid_envelope<T: Into<String>>(reason: T) -> Self {
        ChatError::InvalidEnvelope {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        ChatError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        ChatError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create an already-connected session error
    pub fn already_connected<P: Into<String>>(peer_id: P) -> Self {
        ChatError::Session(SessionError::AlreadyConnected {
            peer_id: peer_id.into(),
        })
    }

    /// Create a not-connected session error
    pub fn not_connected() -> Self {
        ChatError::Session(SessionError::NotConnected)
    }

    /// Create an invalid peer id error
    pub fn invalid_peer_id<P: Into<String>>(peer_id: P) -> Self {
        ChatError::Session(SessionError::InvalidPeerId {
            peer_id: peer_id.into(),
        })
    }

    /// Create a transport connection failed error
    pub fn connection_failed<R: Into<String>>(reason: R) -> Self {
        ChatError::Transport(TransportError::ConnectionFailed {
            reason: reason.into(),
        })
    }

    /// Create a send failed error
    pub fn send_failed<R: Into<String>>(reason: R) -> Self {
        ChatError::Transport(TransportError::SendFailed {
            reason: reason.into(),
        })
    }

    /// Errors after which the logic loop cannot make progress
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChatError::Channel { .. } | ChatError::Configuration { .. }
        )
    }

    /// Text shown to the user when this error surfaces as a notice
    pub fn notice(&self) -> String {
        match self {
            ChatError::Session(err) => err.to_string(),
            ChatError::Media(err) => err.to_string(),
            ChatError::Credential(err) => err.to_string(),
            ChatError::Transport(TransportError::ConnectionFailed { reason }) => {
                format!("Connection error: {}", reason)
            }
            ChatError::Transport(err) => err.to_string(),
            other => other.to_string(),
        }
    }

    /// How prominently the notice should be rendered
    pub fn severity(&self) -> Severity {
        match self {
            ChatError::Media(_) | ChatError::Session(_) | ChatError::Credential(_) => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type ChatResult<T> = core::result::Result<T, ChatError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
