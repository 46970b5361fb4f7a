//! PeerChat Runtime Engine
//!
//! This crate contains the runtime engine for PeerChat, including:
//! - `SessionManager`: the single-session engine (lifecycle, arbitration,
//!   envelope routing)
//! - `ReconnectSupervisor`: recovery from signaling loss and identity
//!   collisions
//! - `CoreLogicTask`: the loop that owns both and talks to the transport and
//!   the UI over channels
//! - `RuntimeBuilder` / `RuntimeHandle`: wiring for applications and tests
//!
//! `peerchat-core` provides the protocol types and sub-protocol state
//! machines; this crate orchestrates them.

pub mod builder;
pub mod logic;
pub mod managers;
pub mod supervisor;

pub use builder::{RuntimeBuilder, RuntimeHandle};
pub use logic::{CoreLogicTask, RuntimeClock};
pub use managers::{Outcome, Session, SessionManager};
pub use supervisor::{ReconnectSupervisor, RecoveryAction, Schedule};

// Re-export core types for convenience
pub use peerchat_core::{
    channel::{AppEventReceiver, CommandSender, EffectReceiver, EventSender},
    AppEvent, ChatConfig, ChatError, ChatResult, Command, Effect, Event, PeerId, SessionContext,
    SessionState, Severity, TransportTask,
};
