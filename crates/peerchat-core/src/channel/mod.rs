//! Channel Module
//!
//! This module contains the CSP (Communicating Sequential Processes) channel infrastructure:
//! - `communication`: Commands, events, effects and app events
//! - `utils`: Channel aliases, constructors and non-blocking send helpers

pub mod communication;
pub mod utils;

// Re-export communication types
pub use communication::{
    AppEvent, CaptureFailure, CloseReason, Command, Effect, Event, InboundMessage, RefuseReason,
    SessionState, Severity,
};

// Re-export ChannelConfig from config module
pub use crate::config::ChannelConfig;

// Re-export utility types
pub use utils::{
    create_app_event_channel, create_command_channel, create_effect_channel, create_event_channel,
    AppEventReceiver, AppEventSender, ChannelError, CommandReceiver, CommandSender,
    EffectReceiver, EffectSender, EventReceiver, EventSender, NonBlockingSend,
};
