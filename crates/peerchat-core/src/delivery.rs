//! Read receipt tracking for outbound messages
//!
//! One record is kept per sent content envelope. A matching read receipt
//! flips it to acknowledged exactly once; repeated or unknown receipts are
//! ignored without error.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::types::MessageId;

// ----------------------------------------------------------------------------
// Delivery Record
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub message_id: MessageId,
    pub acknowledged: bool,
}

/// Result of applying one inbound read receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// The record flipped to acknowledged; surface it to the user
    Updated,
    AlreadyAcknowledged,
    Unknown,
}

// ----------------------------------------------------------------------------
// Delivery Tracker
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DeliveryTracker {
    records: HashMap<MessageId, DeliveryRecord>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a sent envelope
    pub fn track_sent(&mut self, message_id: MessageId) {
        self.records.entry(message_id).or_insert(DeliveryRecord {
            message_id,
            acknowledged: false,
        });
    }

    pub fn acknowledge(&mut self, message_id: MessageId) -> ReceiptOutcome {
        match self.records.get_mut(&message_id) {
            Some(record) if record.acknowledged => ReceiptOutcome::AlreadyAcknowledged,
            Some(record) => {
                record.acknowledged = true;
                ReceiptOutcome::Updated
            }
            None => ReceiptOutcome::Unknown,
        }
    }

    /// Drop the record of a message the user deleted before it was read
    pub fn discard(&mut self, message_id: MessageId) -> Option<DeliveryRecord> {
        self.records.remove(&message_id)
    }

    pub fn get(&self, message_id: &MessageId) -> Option<&DeliveryRecord> {
        self.records.get(message_id)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn statistics(&self) -> DeliveryStatistics {
        let acknowledged = self.records.values().filter(|r| r.acknowledged).count() as u64;
        DeliveryStatistics {
            tracked: self.records.len() as u64,
            acknowledged,
            awaiting: self.records.len() as u64 - acknowledged,
        }
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatistics {
    /// Number of records in the current session
    pub tracked: u64,
    /// Number of records a read receipt arrived for
    pub acknowledged: u64,
    /// Number of records still waiting for a read receipt
    pub awaiting: u64,
}

impl DeliveryStatistics {
    /// Fraction of tracked messages that were read
    pub fn read_rate(&self) -> f64 {
        if self.tracked == 0 {
            0.0
        } else {
            self.acknowledged as f64 / self.tracked as f64
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
