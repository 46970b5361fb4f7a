//! Envelope wire format and codec
//!
//! Every unit of session data travels as one JSON [`Envelope`]. Content-bearing
//! envelopes (message, file, audio) carry their payload as Cipher ciphertext;
//! control envelopes (typing, read receipt) are sent in the clear.
//!
//! Decoding never fails loudly. A wrong secret, tampered ciphertext or a
//! malformed envelope all come back as a [`DecryptFailure`] value that the
//! caller renders as a placeholder.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cipher::{Cipher, PassphraseCipher};
use crate::errors::{ChatError, ChatResult, CipherError, DecryptFailure};
use crate::types::{MessageId, Timestamp};

/// MIME type assumed for recordings from peers that do not declare one
pub const DEFAULT_AUDIO_MIME: &str = "audio/webm";

// ----------------------------------------------------------------------------
// Wire Types
// ----------------------------------------------------------------------------

/// Envelope discriminator as it appears in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeKind {
    Message,
    File,
    Audio,
    Typing,
    ReadReceipt,
}

/// Payload field: ciphertext for content kinds, a flag for typing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Flag(bool),
    Ciphertext(String),
}

/// One unit of protocol data on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default)]
    pub created_at: Timestamp,
}

impl Envelope {
    pub fn to_bytes(&self) -> ChatResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> ChatResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ----------------------------------------------------------------------------
// Application Values
// ----------------------------------------------------------------------------

/// Plaintext content of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    Message {
        text: String,
    },
    File {
        filename: String,
        file_type: String,
        data: Vec<u8>,
    },
    Audio {
        mime: String,
        data: Vec<u8>,
    },
    Typing {
        active: bool,
    },
    ReadReceipt,
}

impl Body {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Body::Message { text: text.into() }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Body::Message { .. } => EnvelopeKind::Message,
            Body::File { .. } => EnvelopeKind::File,
            Body::Audio { .. } => EnvelopeKind::Audio,
            Body::Typing { .. } => EnvelopeKind::Typing,
            Body::ReadReceipt => EnvelopeKind::ReadReceipt,
        }
    }
}

/// Outcome of decoding one inbound envelope
pub type DecodeResult = Result<Body, DecryptFailure>;

// ----------------------------------------------------------------------------
// Envelope Codec
// ----------------------------------------------------------------------------

/// Converts between envelopes and bodies, applying the cipher to content
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    cipher: Arc<dyn Cipher>,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(Arc::new(PassphraseCipher::new()))
    }
}

impl EnvelopeCodec {
    pub fn new(cipher: Arc<dyn Cipher>) -> Self {
        Self { cipher }
    }

    /// Build the wire envelope for `body`
    ///
    /// Content kinds and read receipts must carry an id; typing envelopes
    /// never do.
    pub fn encode(
        &self,
        body: &Body,
        secret: &str,
        id: Option<MessageId>,
        created_at: Timestamp,
    ) -> ChatResult<Envelope> {
        let kind = body.kind();
        let mut envelope = Envelope {
            kind,
            id: None,
            payload: None,
            filename: None,
            file_type: None,
            created_at,
        };

        match body {
            Body::Message { text } => {
                envelope.id = Some(require_id(kind, id)?);
                envelope.payload = Some(Payload::Ciphertext(
                    self.cipher.encrypt(text.as_bytes(), secret)?,
                ));
            }
            Body::File {
                filename,
                file_type,
                data,
            } => {
                envelope.id = Some(require_id(kind, id)?);
                envelope.payload = Some(Payload::Ciphertext(self.cipher.encrypt(data, secret)?));
                envelope.filename = Some(filename.clone());
                envelope.file_type = Some(file_type.clone());
            }
            Body::Audio { mime, data } => {
                envelope.id = Some(require_id(kind, id)?);
                envelope.payload = Some(Payload::Ciphertext(self.cipher.encrypt(data, secret)?));
                envelope.file_type = Some(mime.clone());
            }
            Body::Typing { active } => {
                envelope.payload = Some(Payload::Flag(*active));
            }
            Body::ReadReceipt => {
                envelope.id = Some(require_id(kind, id)?);
            }
        }

        Ok(envelope)
    }

    /// Recover the body of `envelope`, capturing every failure as a value
    pub fn decode(&self, envelope: &Envelope, secret: &str) -> DecodeResult {
        match envelope.kind {
            EnvelopeKind::Message => {
                let plaintext = self.open(envelope, secret)?;
                let text = String::from_utf8(plaintext).map_err(|_| DecryptFailure::InvalidText)?;
                Ok(Body::Message { text })
            }
            EnvelopeKind::File => {
                let filename = envelope
                    .filename
                    .clone()
                    .ok_or_else(|| malformed("file envelope without filename"))?;
                let file_type = envelope
                    .file_type
                    .clone()
                    .ok_or_else(|| malformed("file envelope without fileType"))?;
                let data = self.open(envelope, secret)?;
                Ok(Body::File {
                    filename,
                    file_type,
                    data,
                })
            }
            EnvelopeKind::Audio => {
                let mime = envelope
                    .file_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_string());
                let data = self.open(envelope, secret)?;
                Ok(Body::Audio { mime, data })
            }
            EnvelopeKind::Typing => match envelope.payload {
                Some(Payload::Flag(active)) => Ok(Body::Typing { active }),
                _ => Err(malformed("typing envelope without boolean payload")),
            },
            EnvelopeKind::ReadReceipt => match envelope.id {
                Some(_) => Ok(Body::ReadReceipt),
                None => Err(malformed("read receipt without id")),
            },
        }
    }

    fn open(&self, envelope: &Envelope, secret: &str) -> Result<Vec<u8>, DecryptFailure> {
        if envelope.id.is_none() {
            return Err(malformed("content envelope without id"));
        }
        let ciphertext = match &envelope.payload {
            Some(Payload::Ciphertext(text)) => text,
            _ => return Err(malformed("content envelope without ciphertext")),
        };
        self.cipher
            .decrypt(ciphertext, secret)
            .map_err(|err| {
                debug!(kind = ?envelope.kind, id = ?envelope.id, "payload did not decrypt: {}", err);
                match err {
                    CipherError::InvalidEncoding { reason } => DecryptFailure::Malformed { reason },
                    CipherError::DecryptionFailed | CipherError::EncryptionFailed => {
                        DecryptFailure::Unreadable
                    }
                }
            })
    }
}

fn require_id(kind: EnvelopeKind, id: Option<MessageId>) -> ChatResult<MessageId> {
    id.ok_or_else(|| ChatError::invalid_envelope(format!("{:?} envelope requires an id", kind)))
}

fn malformed(reason: &str) -> DecryptFailure {
    DecryptFailure::Malformed {
        reason: reason.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
