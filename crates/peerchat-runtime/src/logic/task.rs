//! Core Logic Task Implementation
//!
//! Contains the main CoreLogicTask struct and its coordination logic.

use std::collections::VecDeque;

use futures::future;
use peerchat_core::channel::{
    AppEventSender, ChannelError, CommandReceiver, EffectSender, EventReceiver, NonBlockingSend,
};
use peerchat_core::{
    AppEvent, ChatConfig, ChatError, ChatResult, Command, Effect, Event, SessionContext,
};
use tracing::{debug, error, info, warn};

use super::handlers::CommandHandlers;
use super::state::{CoreState, CoreStats};
use crate::managers::Outcome;

// ----------------------------------------------------------------------------
// Core Logic Task
// ----------------------------------------------------------------------------

/// The Core Logic task that processes all commands, events and timers
///
/// Handlers never overlap: one `select!` loop owns the session state and
/// waits on the command channel, the event channel, the earliest pending
/// deadline and room in the effect channel.
///
/// Effects queue in `pending_effects` and drain as the transport makes room,
/// so inbound events keep flowing while the transport is busy. Commands stop
/// being read once the queue reaches `effect_backlog_limit`.
pub struct CoreLogicTask {
    /// Core application state
    state: CoreState,
    /// Channel for receiving commands from the UI
    command_receiver: CommandReceiver,
    /// Channel for receiving events from the transport
    event_receiver: EventReceiver,
    /// Channel for sending effects to the transport
    effect_sender: EffectSender,
    /// Channel for sending app events to the UI
    app_event_sender: AppEventSender,
    /// Effects waiting for room in the effect channel, oldest first
    pending_effects: VecDeque<Effect>,
    /// Queue length at which commands are no longer read
    effect_backlog_limit: usize,
    /// Whether the task should continue running
    running: bool,
}

impl CoreLogicTask {
    /// Create a new Core Logic task
    pub fn new(
        context: SessionContext,
        config: &ChatConfig,
        command_receiver: CommandReceiver,
        event_receiver: EventReceiver,
        effect_sender: EffectSender,
        app_event_sender: AppEventSender,
    ) -> ChatResult<Self> {
        config.validate()?;
        Ok(Self {
            state: CoreState::new(context, config),
            command_receiver,
            event_receiver,
            effect_sender,
            app_event_sender,
            pending_effects: VecDeque::new(),
            effect_backlog_limit: config.channels.effect_buffer_size,
            running: true,
        })
    }

    /// Run the main Core Logic task loop
    pub async fn run(&mut self) -> ChatResult<()> {
        let local_id = self.state.session_manager.local_id().clone();
        info!(peer = %local_id, "Core Logic task starting");

        self.pending_effects.push_back(Effect::Listen { local_id });

        let mut events_open = true;
        let mut transport_gone = false;
        while self.running {
            let wake = self
                .state
                .next_deadline()
                .map(|deadline| self.state.clock.instant_at(deadline));
            let timer = async move {
                match wake {
                    Some(instant) => tokio::time::sleep_until(instant).await,
                    None => future::pending::<()>().await,
                }
            };

            let accepting_commands = self.pending_effects.len() < self.effect_backlog_limit;
            let result = tokio::select! {
                permit = self.effect_sender.clone().reserve_owned(), if !self.pending_effects.is_empty() => match permit {
                    Ok(permit) => {
                        if let Some(effect) = self.pending_effects.pop_front() {
                            permit.send(effect);
                            self.state.stats.effects_generated += 1;
                        }
                        Ok(())
                    }
                    Err(_) => Err(ChatError::from(ChannelError::ChannelClosed)),
                },
                command = self.command_receiver.recv(), if accepting_commands => match command {
                    Some(cmd) => self.process_command(cmd),
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                },
                event = self.event_receiver.recv(), if events_open => match event {
                    Some(evt) => self.process_event(evt),
                    None => {
                        info!("Event channel closed");
                        events_open = false;
                        Ok(())
                    }
                },
                _ = timer => self.process_timers(),
            };

            if let Err(e) = result {
                if e.is_fatal() {
                    error!("Unrecoverable error, shutting down CoreLogicTask: {}", e);
                    transport_gone = true;
                    break;
                }
                warn!("Error processing input: {}", e);
                self.surface_error(&e);
            }
        }

        if !transport_gone {
            self.flush_effects().await;
        }
        info!("Core Logic task stopped");
        Ok(())
    }

    /// Stop the Core Logic task
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Get current statistics
    pub fn stats(&self) -> &CoreStats {
        &self.state.stats
    }

    fn process_command(&mut self, command: Command) -> ChatResult<()> {
        self.state.stats.commands_processed += 1;
        debug!(command = command_name(&command), "Processing command");
        if matches!(command, Command::Shutdown) {
            self.running = false;
        }
        let outcome = CommandHandlers::handle_command(&mut self.state, command)?;
        self.dispatch(outcome);
        Ok(())
    }

    fn process_event(&mut self, event: Event) -> ChatResult<()> {
        self.state.stats.events_processed += 1;
        match &event {
            Event::Data { handle, data } => debug!(%handle, bytes = data.len(), "Processing data"),
            other => debug!(event = ?other, "Processing event"),
        }
        let outcome = CommandHandlers::handle_event(&mut self.state, event)?;
        self.dispatch(outcome);
        Ok(())
    }

    fn process_timers(&mut self) -> ChatResult<()> {
        self.state.stats.timers_fired += 1;
        let outcome = CommandHandlers::handle_timers(&mut self.state)?;
        self.dispatch(outcome);
        Ok(())
    }

    fn dispatch(&mut self, outcome: Outcome) {
        let (effects, app_events) = outcome.into_parts();
        self.pending_effects.extend(effects);
        for app_event in app_events {
            self.send_app_event(app_event);
        }
    }

    /// Hand the remaining backlog to the transport before stopping
    async fn flush_effects(&mut self) {
        while let Some(effect) = self.pending_effects.pop_front() {
            if self.effect_sender.send(effect).await.is_err() {
                debug!(
                    dropped = self.pending_effects.len() + 1,
                    "Effect channel closed during shutdown"
                );
                return;
            }
            self.state.stats.effects_generated += 1;
        }
    }

    /// Send app event to the UI without letting a slow UI stall the session
    fn send_app_event(&mut self, app_event: AppEvent) {
        match &app_event {
            AppEvent::MessageSent { .. } => self.state.stats.messages_sent += 1,
            AppEvent::MessageReceived { .. } => self.state.stats.messages_received += 1,
            _ => {}
        }
        match self.app_event_sender.try_send_non_blocking(app_event) {
            Ok(()) => self.state.stats.app_events_generated += 1,
            Err(ChannelError::ChannelFull) => {
                self.state.stats.app_events_dropped += 1;
                warn!("App event channel full, dropping event");
            }
            Err(ChannelError::ChannelClosed) => {
                debug!("App event channel closed, dropping event");
            }
        }
    }

    /// Turn a recoverable handler error into something the user sees
    fn surface_error(&mut self, error: &ChatError) {
        self.send_app_event(AppEvent::SystemNotice {
            text: error.notice(),
        });
    }
}

/// Log label for a command; payloads may hold plaintext and are never logged
fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Connect { .. } => "connect",
        Command::Disconnect => "disconnect",
        Command::SendText { .. } => "send_text",
        Command::SendFile { .. } => "send_file",
        Command::SendAudio { .. } => "send_audio",
        Command::Composing => "composing",
        Command::BeginCancelHold { .. } => "begin_cancel_hold",
        Command::ReleaseCancelHold { .. } => "release_cancel_hold",
        Command::MediaCaptureFailed { .. } => "media_capture_failed",
        Command::Shutdown => "shutdown",
    }
}
