//! Credential gate for inbound connections
//!
//! A connecting peer declares the shared secret in the connection metadata.
//! The session only activates if it matches the local secret exactly.

use serde::{Deserialize, Serialize};

use crate::errors::CredentialError;
use crate::types::PeerId;

/// Metadata attached to a connection request
///
/// The password travels in the clear on the transport's signaling path.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnectionMetadata {
    pub fn with_password<S: Into<String>>(password: S) -> Self {
        Self {
            password: Some(password.into()),
        }
    }
}

impl core::fmt::Debug for ConnectionMetadata {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionMetadata")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

/// Exact-match comparison of a declared secret against the local one
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialGate;

impl CredentialGate {
    /// No trimming, no case folding. A missing secret is denied.
    pub fn check(candidate: Option<&str>, local: &str) -> GateDecision {
        match candidate {
            Some(secret) if secret.as_bytes() == local.as_bytes() => GateDecision::Allow,
            _ => GateDecision::Deny,
        }
    }

    pub fn check_metadata(metadata: &ConnectionMetadata, local: &str) -> GateDecision {
        Self::check(metadata.password.as_deref(), local)
    }

    /// Gate an inbound request from `remote`, naming why it was denied
    pub fn verify(
        remote: &PeerId,
        metadata: &ConnectionMetadata,
        local: &str,
    ) -> Result<(), CredentialError> {
        if Self::check_metadata(metadata, local).is_allowed() {
            return Ok(());
        }
        let peer_id = remote.to_string();
        match metadata.password {
            Some(_) => Err(CredentialError::Mismatch { peer_id }),
            None => Err(CredentialError::Missing { peer_id }),
        }
    }
}
