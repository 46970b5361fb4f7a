//! PeerChat Core Protocol Implementation
//!
//! This crate provides the foundational types, the envelope wire format and the
//! per-session sub-protocol state machines for one-to-one encrypted PeerChat
//! sessions. Everything here is free of I/O: time is passed in explicitly and
//! side effects are described as values (`Effect`, `AppEvent`) for the runtime
//! to execute.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod cipher;
pub mod config;
pub mod delivery;
pub mod envelope;
pub mod errors;
pub mod gate;
pub mod media;
pub mod outbox;
pub mod presence;
pub mod transport_task;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{
    AppEvent, CaptureFailure, CloseReason, Command, Effect, Event, InboundMessage, RefuseReason,
    SessionState, Severity,
};
pub use cipher::{Cipher, PassphraseCipher};
pub use config::{
    ChannelConfig, ChatConfig, MediaConfig, OutboxConfig, PresenceConfig, ReconnectConfig,
    SessionConfig,
};
pub use delivery::{DeliveryRecord, DeliveryStatistics, DeliveryTracker, ReceiptOutcome};
pub use envelope::{Body, DecodeResult, Envelope, EnvelopeCodec, EnvelopeKind, Payload};
pub use errors::{
    ChatError, ChatResult, CipherError, CredentialError, DecryptFailure, MediaError, OutboxError,
    SessionError, TransportError,
};
pub use gate::{ConnectionMetadata, CredentialGate, GateDecision};
pub use media::MediaValidator;
pub use outbox::{PendingMessage, PendingOutbox, PendingStage};
pub use presence::{PresenceState, PresenceTracker};
pub use transport_task::TransportTask;
pub use types::{
    ConnectionHandle, MessageId, MessageIdAllocator, PeerId, SessionContext, SystemTimeSource,
    TimeSource, Timestamp,
};

pub type Result<T> = ChatResult<T>;
