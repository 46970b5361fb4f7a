//! Channel Utilities for CSP Communication
//!
//! All four channels are bounded `tokio::sync::mpsc` queues sized from
//! [`ChannelConfig`]. There is exactly one consumer per channel: the Core
//! Logic task reads commands and events, the transport reads effects and the
//! UI reads app events.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::channel::communication::{AppEvent, Command, Effect, Event};
use crate::config::ChannelConfig;
use crate::errors::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel buffer is full")]
    ChannelFull,
    #[error("Channel is closed")]
    ChannelClosed,
}

impl From<ChannelError> for ChatError {
    fn from(err: ChannelError) -> Self {
        ChatError::channel_error(err.to_string())
    }
}

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;
pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;
pub type EffectSender = mpsc::Sender<Effect>;
pub type EffectReceiver = mpsc::Receiver<Effect>;
pub type AppEventSender = mpsc::Sender<AppEvent>;
pub type AppEventReceiver = mpsc::Receiver<AppEvent>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create bounded command channel (UI → Core Logic)
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size)
}

/// Create bounded event channel (Transport → Core Logic)
pub fn create_event_channel(config: &ChannelConfig) -> (EventSender, EventReceiver) {
    mpsc::channel(config.event_buffer_size)
}

/// Create bounded effect channel (Core Logic → Transport)
pub fn create_effect_channel(config: &ChannelConfig) -> (EffectSender, EffectReceiver) {
    mpsc::channel(config.effect_buffer_size)
}

/// Create bounded app event channel (Core Logic → UI)
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    mpsc::channel(config.app_event_buffer_size)
}

// ----------------------------------------------------------------------------
// Non-blocking Send Utilities
// ----------------------------------------------------------------------------

/// Non-blocking send so a slow consumer cannot stall the sender
pub trait NonBlockingSend<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError>;
}

impl<T> NonBlockingSend<T> for mpsc::Sender<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError> {
        self.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::ChannelFull,
            TrySendError::Closed(_) => ChannelError::ChannelClosed,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
