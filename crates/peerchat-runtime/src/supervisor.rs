//! Reconnect Supervisor
//!
//! Schedules recovery from signaling-level failures:
//! - the signaling link dropped without a local request → reconnect after
//!   `reconnect_delay_ms`
//! - our identity is already taken → retry under a fresh identity after
//!   `identity_retry_delay_ms`
//!
//! Retries use a fixed interval. They are unbounded unless
//! `ReconnectConfig::max_attempts` is set; the attempt counter resets every
//! time the transport reports it is listening again.

use peerchat_core::{ReconnectConfig, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Recovery Actions
// ----------------------------------------------------------------------------

/// What the logic task should do when a scheduled recovery comes due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryAction {
    /// Re-register on the signaling layer under the current identity
    Reconnect,
    /// Pick a fresh identity and listen under it
    AcquireIdentity,
}

/// Result of reporting a failure to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Recovery will run at the given time
    At(Timestamp),
    /// The user tore the runtime down; nothing to recover
    Suppressed,
    /// The attempt budget is spent
    GaveUp { attempts: u32 },
}

// ----------------------------------------------------------------------------
// Reconnect Supervisor
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReconnectSupervisor {
    config: ReconnectConfig,
    scheduled: Option<(RecoveryAction, Timestamp)>,
    attempts: u32,
    torn_down: bool,
}

impl ReconnectSupervisor {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            scheduled: None,
            attempts: 0,
            torn_down: false,
        }
    }

    /// The signaling link dropped and the user did not ask for it
    pub fn on_transport_disconnected(&mut self, now: Timestamp) -> Schedule {
        if self.torn_down {
            debug!("Signaling lost after teardown, not reconnecting");
            return Schedule::Suppressed;
        }
        self.schedule(
            RecoveryAction::Reconnect,
            now + self.config.reconnect_delay_ms,
        )
    }

    /// The transport refused our identity because someone else holds it
    pub fn on_identity_unavailable(&mut self, now: Timestamp) -> Schedule {
        if self.torn_down {
            return Schedule::Suppressed;
        }
        self.schedule(
            RecoveryAction::AcquireIdentity,
            now + self.config.identity_retry_delay_ms,
        )
    }

    /// The user is shutting down; a pending reconnect must not fire
    pub fn on_user_teardown(&mut self) {
        self.torn_down = true;
        if let Some((action, _)) = self.scheduled.take() {
            debug!(?action, "Cancelled pending recovery");
        }
    }

    /// Registration succeeded
    pub fn on_listening(&mut self) {
        if self.attempts > 0 {
            info!(attempts = self.attempts, "Signaling recovered");
        }
        self.attempts = 0;
        self.scheduled = None;
    }

    /// Take the scheduled action if it is due
    pub fn poll(&mut self, now: Timestamp) -> Option<RecoveryAction> {
        match self.scheduled {
            Some((action, deadline)) if now >= deadline => {
                self.scheduled = None;
                Some(action)
            }
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.scheduled.map(|(_, deadline)| deadline)
    }

    pub fn scheduled(&self) -> Option<RecoveryAction> {
        self.scheduled.map(|(action, _)| action)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn schedule(&mut self, action: RecoveryAction, at: Timestamp) -> Schedule {
        if let Some(max) = self.config.max_attempts {
            if self.attempts >= max {
                warn!(attempts = self.attempts, ?action, "Giving up recovery");
                self.scheduled = None;
                return Schedule::GaveUp {
                    attempts: self.attempts,
                };
            }
        }
        self.attempts += 1;
        self.scheduled = Some((action, at));
        debug!(?action, attempt = self.attempts, at = at.as_millis(), "Recovery scheduled");
        Schedule::At(at)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
