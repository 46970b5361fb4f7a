//! Typing indicator state machine
//!
//! Local composing signals are debounced into edge-triggered Typing envelopes:
//! one `true` when composing starts and one `false` once input has been idle
//! for the configured interval. Remote typing flags are mirrored as-is.

use serde::{Deserialize, Serialize};

use crate::config::PresenceConfig;
use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    pub local_typing: bool,
    pub remote_typing: bool,
}

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    config: PresenceConfig,
    state: PresenceState,
    idle_deadline: Option<Timestamp>,
}

impl PresenceTracker {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            state: PresenceState::default(),
            idle_deadline: None,
        }
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    /// The user produced input. Returns `Some(true)` on the not-typing to
    /// typing edge and `None` while already typing; either way the idle timer
    /// restarts.
    pub fn on_local_composing(&mut self, now: Timestamp) -> Option<bool> {
        self.idle_deadline = Some(now + self.config.typing_idle_ms);
        if self.state.local_typing {
            None
        } else {
            self.state.local_typing = true;
            Some(true)
        }
    }

    /// Returns `Some(false)` exactly once when the idle timer has elapsed
    pub fn poll(&mut self, now: Timestamp) -> Option<bool> {
        match self.idle_deadline {
            Some(deadline) if now >= deadline => {
                self.idle_deadline = None;
                self.state.local_typing = false;
                Some(false)
            }
            _ => None,
        }
    }

    /// Record the peer's typing flag, reporting it only when it changed
    pub fn on_remote_typing(&mut self, typing: bool) -> Option<bool> {
        if self.state.remote_typing == typing {
            return None;
        }
        self.state.remote_typing = typing;
        Some(typing)
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.idle_deadline
    }

    /// Forget all presence state when the session ends
    pub fn reset(&mut self) {
        self.state = PresenceState::default();
        self.idle_deadline = None;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
