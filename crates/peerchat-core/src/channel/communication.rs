//! CSP Channel Communication Protocol Types
//!
//! This module defines the typed communication protocol.
//! All inter-task communication flows through these channel message types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::envelope::{Body, DecodeResult, EnvelopeKind};
use crate::gate::ConnectionMetadata;
use crate::outbox::PendingStage;
use crate::types::{ConnectionHandle, MessageId, PeerId, Timestamp};

// ----------------------------------------------------------------------------
// Command: UI/External → Core Logic
// ----------------------------------------------------------------------------

/// Commands sent from the UI to the Core Logic task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Connect to a peer. `remote` is raw user input; `secret` defaults to
    /// the local secret.
    Connect {
        remote: String,
        secret: Option<String>,
    },
    /// Close the active session
    Disconnect,
    SendText {
        text: String,
    },
    SendFile {
        filename: String,
        file_type: String,
        data: Vec<u8>,
    },
    SendAudio {
        mime: String,
        data: Vec<u8>,
    },
    /// The user produced input in the compose box
    Composing,
    /// Press-and-hold on a message started
    BeginCancelHold {
        message_id: MessageId,
    },
    /// Press-and-hold on a message released
    ReleaseCancelHold {
        message_id: MessageId,
    },
    /// The media source could not capture a recording
    MediaCaptureFailed {
        failure: CaptureFailure,
    },
    /// Shutdown the system gracefully
    Shutdown,
}

// ----------------------------------------------------------------------------
// Event: Transport → Core Logic
// ----------------------------------------------------------------------------

/// Events sent from the Transport task to the Core Logic task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Registered on the signaling layer under `local_id`
    Listening { local_id: PeerId },
    /// `local_id` is already registered by someone else
    IdentityUnavailable { local_id: PeerId },
    /// An outbound connection opened
    Opened { handle: ConnectionHandle },
    /// A peer wants to connect
    Inbound {
        handle: ConnectionHandle,
        remote: PeerId,
        metadata: ConnectionMetadata,
    },
    /// One envelope arrived on a connection
    Data {
        handle: ConnectionHandle,
        data: Vec<u8>,
    },
    Closed { handle: ConnectionHandle },
    /// Connection-level error, or signaling-level when `handle` is `None`
    Error {
        handle: Option<ConnectionHandle>,
        error: String,
    },
    /// The signaling link dropped without a local request
    Disconnected,
    SendComplete {
        handle: ConnectionHandle,
        message_id: MessageId,
    },
    SendFailed {
        handle: ConnectionHandle,
        message_id: MessageId,
        error: String,
    },
}

// ----------------------------------------------------------------------------
// Effect: Core Logic → Transport (External Side Effects Only)
// ----------------------------------------------------------------------------

/// Effects sent from the Core Logic task to the Transport task
/// Effects describe external side effects only - no UI knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Effect {
    /// Register on the signaling layer
    Listen { local_id: PeerId },
    /// Open a connection carrying `metadata`
    Connect {
        handle: ConnectionHandle,
        remote: PeerId,
        metadata: ConnectionMetadata,
    },
    /// Complete an inbound connection
    Accept { handle: ConnectionHandle },
    /// Turn an inbound connection away
    Refuse {
        handle: ConnectionHandle,
        reason: RefuseReason,
    },
    /// Deliver one encoded envelope. `message_id` is set when a send
    /// confirmation is expected back.
    Send {
        handle: ConnectionHandle,
        message_id: Option<MessageId>,
        data: Vec<u8>,
    },
    Close { handle: ConnectionHandle },
    /// Re-register on the signaling layer after a drop
    Reconnect,
}

// ----------------------------------------------------------------------------
// AppEvent: Core Logic → UI (State Changes Only)
// ----------------------------------------------------------------------------

/// Application events sent from the Core Logic task to the UI task
/// AppEvents describe state changes that UI components need to know about
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    /// The identity others can connect to
    IdentityAssigned { local_id: PeerId },
    StatusChanged { text: String, severity: Severity },
    SystemNotice { text: String },
    SessionStateChanged {
        state: SessionState,
        remote: Option<PeerId>,
    },
    /// A local send was staged and should be rendered as pending
    MessageSent {
        message_id: MessageId,
        body: Body,
        created_at: Timestamp,
    },
    MessageReceived { message: InboundMessage },
    TypingChanged { typing: bool },
    ReceiptUpdated { message_id: MessageId },
    PendingStateChanged {
        message_id: MessageId,
        kind: EnvelopeKind,
        stage: PendingStage,
    },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Decoded inbound content envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: Option<MessageId>,
    pub kind: EnvelopeKind,
    pub created_at: Timestamp,
    pub content: DecodeResult,
}

/// Lifecycle of the single session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Rejected,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Open => write!(f, "Open"),
            SessionState::Rejected => write!(f, "Rejected"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Rendering hint for status lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// The local user disconnected
    Local,
    /// The remote side closed the connection
    Remote,
    /// The connection did not open in time
    Timeout,
}

/// Why an inbound connection was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefuseReason {
    /// A session is already open
    Duplicate,
    /// The declared secret did not match
    WrongCredential,
}

/// Capture failures reported by the media source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureFailure {
    Denied,
    Unsupported,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
