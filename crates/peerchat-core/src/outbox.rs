//! Pending outbound messages and hold-to-delete
//!
//! A send is registered as `Staging` until the transport confirms it, then
//! moves out of the pending registry into the set of sent messages. Either
//! kind of entry can be deleted by holding it: the hold arms a timer and the
//! entry is cancelled only if the hold is not released before it elapses.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::config::OutboxConfig;
use crate::envelope::EnvelopeKind;
use crate::errors::OutboxError;
use crate::types::{MessageId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingStage {
    Staging,
    Committed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub id: MessageId,
    pub kind: EnvelopeKind,
    pub stage: PendingStage,
}

#[derive(Debug, Clone)]
pub struct PendingOutbox {
    config: OutboxConfig,
    /// Entries still waiting for the transport
    pending: HashMap<MessageId, PendingMessage>,
    /// Committed entries that can still be deleted
    sent: HashMap<MessageId, PendingMessage>,
    holds: HashMap<MessageId, Timestamp>,
}

impl PendingOutbox {
    pub fn new(config: OutboxConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            sent: HashMap::new(),
            holds: HashMap::new(),
        }
    }

    pub fn begin_staging(&mut self, id: MessageId, kind: EnvelopeKind) -> Result<(), OutboxError> {
        if self.pending.contains_key(&id) || self.sent.contains_key(&id) {
            return Err(OutboxError::DuplicateId { id: id.to_string() });
        }
        self.pending.insert(
            id,
            PendingMessage {
                id,
                kind,
                stage: PendingStage::Staging,
            },
        );
        Ok(())
    }

    /// Staging → Committed. Returns `None` when the entry was already
    /// cancelled or never staged, in which case the confirmation is stale.
    pub fn commit(&mut self, id: MessageId) -> Option<PendingMessage> {
        let mut entry = self.pending.remove(&id)?;
        entry.stage = PendingStage::Committed;
        self.sent.insert(id, entry);
        Some(entry)
    }

    /// Staging → Cancelled after the transport refused the send
    pub fn abort(&mut self, id: MessageId) -> Option<PendingMessage> {
        let mut entry = self.pending.remove(&id)?;
        self.holds.remove(&id);
        entry.stage = PendingStage::Cancelled;
        Some(entry)
    }

    /// Arm the delete timer for a staged or sent message
    pub fn begin_cancel_hold(&mut self, id: MessageId, now: Timestamp) -> Result<Timestamp, OutboxError> {
        if !self.pending.contains_key(&id) && !self.sent.contains_key(&id) {
            return Err(OutboxError::UnknownId { id: id.to_string() });
        }
        let deadline = now + self.config.cancel_hold_ms;
        self.holds.insert(id, deadline);
        Ok(deadline)
    }

    /// Disarm the delete timer; the entry's stage is untouched
    pub fn cancel_cancel_hold(&mut self, id: MessageId) -> bool {
        self.holds.remove(&id).is_some()
    }

    /// Cancel every entry whose hold has elapsed, in id order
    pub fn poll(&mut self, now: Timestamp) -> Vec<PendingMessage> {
        let mut expired: Vec<MessageId> = self
            .holds
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(id, _)| *id)
            .collect();
        expired.sort();

        let mut cancelled = Vec::with_capacity(expired.len());
        for id in expired {
            self.holds.remove(&id);
            let entry = self.pending.remove(&id).or_else(|| self.sent.remove(&id));
            if let Some(mut entry) = entry {
                entry.stage = PendingStage::Cancelled;
                cancelled.push(entry);
            }
        }
        cancelled
    }

    pub fn stage(&self, id: &MessageId) -> Option<PendingStage> {
        self.pending
            .get(id)
            .or_else(|| self.sent.get(id))
            .map(|entry| entry.stage)
    }

    pub fn is_holding(&self, id: &MessageId) -> bool {
        self.holds.contains_key(id)
    }

    /// Number of entries still in `Staging`
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.holds.values().min().copied()
    }

    /// Drop everything at session end, returning the entries that never
    /// left `Staging`
    pub fn clear(&mut self) -> Vec<PendingMessage> {
        let mut abandoned: Vec<PendingMessage> = self
            .pending
            .drain()
            .map(|(_, mut entry)| {
                entry.stage = PendingStage::Cancelled;
                entry
            })
            .collect();
        abandoned.sort_by_key(|entry| entry.id);
        self.sent.clear();
        self.holds.clear();
        abandoned
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
