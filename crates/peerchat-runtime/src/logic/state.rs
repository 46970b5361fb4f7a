//! Core Logic State Management
//!
//! Contains the state owned by the Core Logic task, its statistics and the
//! tokio-backed clock that drives every deadline.

use std::time::Duration;

use peerchat_core::{ChatConfig, SessionContext, TimeSource, Timestamp};
use serde::Serialize;
use tokio::time::Instant;

use crate::managers::SessionManager;
use crate::supervisor::ReconnectSupervisor;

// ----------------------------------------------------------------------------
// Runtime Clock
// ----------------------------------------------------------------------------

/// Wall-clock timestamps that advance with the tokio clock
///
/// The epoch is sampled once; afterwards time is measured with
/// `tokio::time::Instant`, so a paused test runtime controls every deadline.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeClock {
    epoch: Timestamp,
    origin: Instant,
}

impl RuntimeClock {
    pub fn new() -> Self {
        Self {
            epoch: Timestamp::now(),
            origin: Instant::now(),
        }
    }

    /// The tokio instant at which `timestamp` is reached
    pub fn instant_at(&self, timestamp: Timestamp) -> Instant {
        self.origin + Duration::from_millis(timestamp - self.epoch)
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for RuntimeClock {
    fn now(&self) -> Timestamp {
        self.epoch + self.origin.elapsed().as_millis() as u64
    }
}

// ----------------------------------------------------------------------------
// Core Logic State
// ----------------------------------------------------------------------------

/// Core application state owned by the Core Logic task
#[derive(Debug)]
pub struct CoreState {
    /// Single-session engine
    pub session_manager: SessionManager<RuntimeClock>,
    /// Signaling recovery scheduler
    pub supervisor: ReconnectSupervisor,
    pub clock: RuntimeClock,
    pub stats: CoreStats,
}

impl CoreState {
    pub fn new(context: SessionContext, config: &ChatConfig) -> Self {
        let clock = RuntimeClock::new();
        Self {
            session_manager: SessionManager::new(context, config, clock),
            supervisor: ReconnectSupervisor::new(config.reconnect.clone()),
            clock,
            stats: CoreStats::default(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Earliest deadline of any timer owned by this state
    pub fn next_deadline(&self) -> Option<Timestamp> {
        match (
            self.session_manager.next_deadline(),
            self.supervisor.next_deadline(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Statistics for the Core Logic task
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoreStats {
    pub commands_processed: u64,
    pub events_processed: u64,
    pub timers_fired: u64,
    pub effects_generated: u64,
    pub app_events_generated: u64,
    pub app_events_dropped: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_runtime_clock_follows_tokio_time() {
        let clock = RuntimeClock::new();
        let start = clock.now();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(clock.now() - start, 1_500);

        let deadline = start + 2_000;
        tokio::time::sleep_until(clock.instant_at(deadline)).await;
        assert!(clock.now() >= deadline);
    }

    #[tokio::test]
    async fn test_next_deadline_is_earliest_timer() {
        let mut state = CoreState::new(SessionContext::generate("pw"), &ChatConfig::default());
        assert_eq!(state.next_deadline(), None);

        let now = state.now();
        state.supervisor.on_identity_unavailable(now);
        state
            .session_manager
            .initiate_connection("bob", None)
            .unwrap();

        assert_eq!(state.next_deadline(), Some(now + 2_000));
    }
}
