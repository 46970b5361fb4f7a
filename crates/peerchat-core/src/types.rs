//! Core types for the PeerChat protocol
//!
//! This module defines the fundamental types used throughout the protocol,
//! using newtype patterns for semantic validation and type safety.

use core::fmt;
use core::ops::{Add, Sub};
use core::str::FromStr;

use rand_core::{OsRng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::errors::{ChatError, SessionError};

// ----------------------------------------------------------------------------
// Peer Identifier
// ----------------------------------------------------------------------------

const PEER_ID_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of a freshly generated peer identifier
pub const GENERATED_PEER_ID_LEN: usize = 8;

/// Identifier a peer is reachable under on the transport's signaling layer
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a PeerId without validation
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Generate a random lowercase base-36 identifier
    pub fn generate() -> Self {
        let id = (0..GENERATED_PEER_ID_LEN)
            .map(|_| {
                let index = (OsRng.next_u32() % PEER_ID_ALPHABET.len() as u32) as usize;
                PEER_ID_ALPHABET[index] as char
            })
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = ChatError;

    /// Parse user input into a PeerId, trimming surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Session(SessionError::EmptyRemoteId));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ChatError::invalid_peer_id(trimmed));
        }
        Ok(Self(trimmed.to_string()))
    }
}

// ----------------------------------------------------------------------------
// Connection Handle
// ----------------------------------------------------------------------------

/// Opaque handle naming one transport-level connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle(Uuid);

impl ConnectionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

// ----------------------------------------------------------------------------
// Message Identifier
// ----------------------------------------------------------------------------

/// Correlation id of an envelope, unique per sender per session
///
/// Serialized as a decimal string. Numeric JSON values are accepted on input
/// for peers that emit raw millisecond timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(u64);

impl MessageId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ChatError::invalid_envelope(format!("invalid message id: {}", s)))
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MessageIdVisitor;

        impl<'de> de::Visitor<'de> for MessageIdVisitor {
            type Value = MessageId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a message id as a decimal string or unsigned integer")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<MessageId, E> {
                Ok(MessageId(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<MessageId, E> {
                u64::try_from(value)
                    .map(MessageId)
                    .map_err(|_| E::custom("message id must not be negative"))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<MessageId, E> {
                value
                    .trim()
                    .parse::<u64>()
                    .map(MessageId)
                    .map_err(|_| E::custom(format!("invalid message id: {}", value)))
            }
        }

        deserializer.deserialize_any(MessageIdVisitor)
    }
}

/// Allocates message ids from the clock, never handing out the same id twice
///
/// Ids follow the millisecond clock but are bumped past the previous id when
/// the clock stalls or steps backwards, so the sequence is strictly increasing.
#[derive(Debug, Clone, Default)]
pub struct MessageIdAllocator {
    last: Option<u64>,
}

impl MessageIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, now: Timestamp) -> MessageId {
        let candidate = now.as_millis();
        let id = match self.last {
            Some(last) if candidate <= last => last + 1,
            _ => candidate,
        };
        self.last = Some(id);
        MessageId(id)
    }

    /// Most recently allocated id
    pub fn last(&self) -> Option<MessageId> {
        self.last.map(MessageId)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, other: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(other))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl Timestamp {
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get duration since another timestamp
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Source of timestamps for the session state machines
///
/// Managers never read the clock directly, which keeps debounce, hold and
/// retry timers deterministic under test.
pub trait TimeSource {
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

// ----------------------------------------------------------------------------
// Session Context
// ----------------------------------------------------------------------------

/// Local identity and credential owned by the application root
///
/// Passed explicitly into the session manager instead of living in globals,
/// so several independent peers can run in one process.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub local_id: PeerId,
    pub local_secret: String,
}

impl SessionContext {
    pub fn new<S: Into<String>>(local_id: PeerId, local_secret: S) -> Self {
        Self {
            local_id,
            local_secret: local_secret.into(),
        }
    }

    /// Context with a freshly generated identity
    pub fn generate<S: Into<String>>(local_secret: S) -> Self {
        Self::new(PeerId::generate(), local_secret)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("local_id", &self.local_id)
            .field("local_secret", &"<redacted>")
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
