//! Core Logic Command and Event Handlers
//!
//! Maps each command, transport event and timer tick onto the session
//! manager and the reconnect supervisor.

use peerchat_core::{AppEvent, ChatResult, CloseReason, Command, Effect, Event, PeerId, Severity};
use tracing::{debug, info};

use super::state::CoreState;
use crate::managers::Outcome;
use crate::supervisor::{RecoveryAction, Schedule};

/// Command and event handlers for the Core Logic task
pub struct CommandHandlers;

impl CommandHandlers {
    /// Handle a command from the UI
    pub fn handle_command(state: &mut CoreState, command: Command) -> ChatResult<Outcome> {
        let manager = &mut state.session_manager;
        match command {
            Command::Connect { remote, secret } => manager.initiate_connection(&remote, secret),
            Command::Disconnect => Ok(manager.close_session(CloseReason::Local)),
            Command::SendText { text } => manager.send_text(&text),
            Command::SendFile {
                filename,
                file_type,
                data,
            } => manager.send_file(filename, file_type, data),
            Command::SendAudio { mime, data } => manager.send_audio(mime, data),
            Command::Composing => manager.composing(),
            Command::BeginCancelHold { message_id } => Ok(manager.begin_cancel_hold(message_id)),
            Command::ReleaseCancelHold { message_id } => {
                Ok(manager.release_cancel_hold(message_id))
            }
            Command::MediaCaptureFailed { failure } => manager.media_capture_failed(failure),
            Command::Shutdown => {
                info!("Shutdown requested");
                state.supervisor.on_user_teardown();
                Ok(manager.close_session(CloseReason::Local))
            }
        }
    }

    /// Handle an event from the transport
    pub fn handle_event(state: &mut CoreState, event: Event) -> ChatResult<Outcome> {
        let now = state.now();
        let manager = &mut state.session_manager;
        match event {
            Event::Listening { local_id } => {
                state.supervisor.on_listening();
                Ok(manager.on_listening(local_id))
            }
            Event::IdentityUnavailable { local_id } => {
                let mut outcome = Outcome::new();
                match state.supervisor.on_identity_unavailable(now) {
                    Schedule::At(_) => outcome.push_event(AppEvent::StatusChanged {
                        text: format!("ID {} is taken, retrying with a new one", local_id),
                        severity: Severity::Warning,
                    }),
                    Schedule::GaveUp { attempts } => outcome.push_event(AppEvent::StatusChanged {
                        text: format!("Could not register an ID after {} attempts", attempts),
                        severity: Severity::Error,
                    }),
                    Schedule::Suppressed => {}
                }
                Ok(outcome)
            }
            Event::Opened { handle } => Ok(manager.handle_transport_open(handle)),
            Event::Inbound {
                handle,
                remote,
                metadata,
            } => Ok(manager.accept_inbound_connection(handle, remote, &metadata)),
            Event::Data { handle, data } => manager.handle_transport_data(handle, &data),
            Event::Closed { handle } => Ok(manager.handle_transport_close(handle)),
            Event::Error { handle, error } => Ok(manager.handle_transport_error(handle, &error)),
            Event::Disconnected => {
                let mut outcome = Outcome::new();
                match state.supervisor.on_transport_disconnected(now) {
                    Schedule::At(at) => outcome.push_event(AppEvent::StatusChanged {
                        text: format!(
                            "Lost connection to signaling server, reconnecting in {}s",
                            (at - now) / 1_000
                        ),
                        severity: Severity::Warning,
                    }),
                    Schedule::GaveUp { attempts } => outcome.push_event(AppEvent::StatusChanged {
                        text: format!("Gave up reconnecting after {} attempts", attempts),
                        severity: Severity::Error,
                    }),
                    Schedule::Suppressed => {}
                }
                Ok(outcome)
            }
            Event::SendComplete { handle, message_id } => {
                Ok(manager.handle_send_complete(handle, message_id))
            }
            Event::SendFailed {
                handle,
                message_id,
                error,
            } => Ok(manager.handle_send_failed(handle, message_id, &error)),
        }
    }

    /// Fire every deadline that has elapsed
    pub fn handle_timers(state: &mut CoreState) -> ChatResult<Outcome> {
        let now = state.now();
        let mut outcome = state.session_manager.poll_timers()?;

        match state.supervisor.poll(now) {
            Some(RecoveryAction::Reconnect) => {
                debug!("Reconnecting to signaling server");
                outcome.push_effect(Effect::Reconnect);
                outcome.push_event(AppEvent::StatusChanged {
                    text: "Reconnecting...".to_string(),
                    severity: Severity::Info,
                });
            }
            Some(RecoveryAction::AcquireIdentity) => {
                let local_id = PeerId::generate();
                outcome.push_effect(state.session_manager.replace_identity(local_id));
            }
            None => {}
        }

        Ok(outcome)
    }
}
