//! Command handlers for the PeerChat CLI

use std::time::Duration;

use peerchat_core::{Body, DecryptFailure, InboundMessage, PendingStage};
use peerchat_harness::LoopbackNetwork;
use peerchat_runtime::{
    AppEvent, AppEventReceiver, Command, PeerId, RuntimeBuilder, RuntimeHandle, SessionContext,
    SessionState,
};
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::config::CliAppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: CliAppConfig) -> Result<()> {
        match cli.command {
            Commands::Demo {
                secret,
                remote_secret,
                message,
            } => Self::handle_demo_command(config, secret, remote_secret, message).await,
            Commands::Config { output } => Self::handle_config_command(output),
            Commands::Id => Self::handle_id_command(&config),
        }
    }

    /// Run a local peer and a friend over the loopback network
    async fn handle_demo_command(
        config: CliAppConfig,
        secret: Option<String>,
        remote_secret: Option<String>,
        message: String,
    ) -> Result<()> {
        let local_secret = secret.unwrap_or_else(|| config.secret());
        let remote_secret = remote_secret.unwrap_or_else(|| local_secret.clone());
        let network = LoopbackNetwork::new();

        let local_context = SessionContext::new(config.peer_id()?, local_secret);
        let mut local = DemoPeer::start("you", local_context, &config, &network).await?;
        let mut friend = DemoPeer::start(
            "friend",
            SessionContext::generate(remote_secret),
            &config,
            &network,
        )
        .await?;

        let local_id = local.wait_for_identity().await?;
        let friend_id = friend.wait_for_identity().await?;
        info!(local = %local_id, friend = %friend_id, "Both peers registered");

        local
            .handle
            .send_command(Command::Connect {
                remote: friend_id.to_string(),
                secret: None,
            })
            .await?;

        let settle = config.core.session.connect_timeout() + Duration::from_secs(1);
        let opened = local
            .wait_until(settle, |event| {
                matches!(
                    event,
                    AppEvent::SessionStateChanged {
                        state: SessionState::Open | SessionState::Closed,
                        ..
                    }
                )
            })
            .await;
        friend.drain();

        let open = matches!(
            opened,
            Some(AppEvent::SessionStateChanged {
                state: SessionState::Open,
                ..
            })
        );
        if open {
            local
                .handle
                .send_command(Command::SendText { text: message })
                .await?;
            friend
                .wait_until(settle, |event| {
                    matches!(event, AppEvent::MessageReceived { .. })
                })
                .await;
            local
                .wait_until(settle, |event| {
                    matches!(event, AppEvent::ReceiptUpdated { .. })
                })
                .await;
        } else {
            println!("Session did not open; check that both peers use the same password");
        }

        local.stop().await?;
        friend.stop().await?;
        friend.drain();
        if open {
            Ok(())
        } else {
            Err(CliError::Demo("Session did not open".to_string()))
        }
    }

    /// Print or write the example configuration
    fn handle_config_command(output: Option<String>) -> Result<()> {
        let example = CliAppConfig::example_config();
        match output {
            Some(path) => {
                std::fs::write(&path, example)?;
                println!("Wrote example configuration to {}", path);
            }
            None => print!("{}", example),
        }
        Ok(())
    }

    fn handle_id_command(config: &CliAppConfig) -> Result<()> {
        match &config.identity.peer_id {
            Some(_) => println!("{}", config.peer_id()?),
            None => println!("{} (random, set identity.peer_id to keep it)", config.peer_id()?),
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Demo Peer
// ----------------------------------------------------------------------------

struct DemoPeer {
    label: &'static str,
    handle: RuntimeHandle,
    events: AppEventReceiver,
}

impl DemoPeer {
    async fn start(
        label: &'static str,
        context: SessionContext,
        config: &CliAppConfig,
        network: &LoopbackNetwork,
    ) -> Result<Self> {
        let mut handle = RuntimeBuilder::new(context)
            .with_config(config.core.clone())
            .with_transport(Box::new(network.transport()))
            .build_and_start()
            .await?;
        let events = handle
            .take_app_event_receiver()
            .ok_or_else(|| CliError::Demo("App event receiver already taken".to_string()))?;
        Ok(Self {
            label,
            handle,
            events,
        })
    }

    async fn wait_for_identity(&mut self) -> Result<PeerId> {
        let event = self
            .wait_until(Duration::from_secs(30), |event| {
                matches!(event, AppEvent::IdentityAssigned { .. })
            })
            .await;
        match event {
            Some(AppEvent::IdentityAssigned { local_id }) => Ok(local_id),
            _ => Err(CliError::Demo(format!(
                "{} never registered an ID",
                self.label
            ))),
        }
    }

    /// Print events until one matches or `limit` elapses
    async fn wait_until<F>(&mut self, limit: Duration, mut predicate: F) -> Option<AppEvent>
    where
        F: FnMut(&AppEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(event)) => {
                    self.print(&event);
                    if predicate(&event) {
                        return Some(event);
                    }
                }
                Ok(None) => return None,
                Err(_) => {
                    debug!(peer = self.label, "Gave up waiting for event");
                    return None;
                }
            }
        }
    }

    /// Print whatever is already queued
    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.print(&event);
        }
    }

    fn print(&self, event: &AppEvent) {
        if let Some(line) = render(event) {
            println!("[{}] {}", self.label, line);
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.handle.shutdown().await?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Rendering
// ----------------------------------------------------------------------------

/// One display line per app event; bookkeeping events render as nothing
pub fn render(event: &AppEvent) -> Option<String> {
    match event {
        AppEvent::IdentityAssigned { .. } => None,
        AppEvent::StatusChanged { text, severity } => Some(format!("status ({:?}): {}", severity, text)),
        AppEvent::SystemNotice { text } => Some(format!("* {}", text)),
        AppEvent::SessionStateChanged { state, remote } => Some(match remote {
            Some(remote) => format!("session {:?} with {}", state, remote),
            None => format!("session {:?}", state),
        }),
        AppEvent::MessageSent { body, .. } => Some(format!("me: {}", render_body(body))),
        AppEvent::MessageReceived { message } => Some(format!("friend: {}", render_inbound(message))),
        AppEvent::TypingChanged { typing: true } => Some("friend is typing...".to_string()),
        AppEvent::TypingChanged { typing: false } => None,
        AppEvent::ReceiptUpdated { message_id } => Some(format!("read: {}", message_id)),
        AppEvent::PendingStateChanged {
            message_id,
            stage: PendingStage::Cancelled,
            ..
        } => Some(format!("deleted: {}", message_id)),
        AppEvent::PendingStateChanged { .. } => None,
    }
}

fn render_inbound(message: &InboundMessage) -> String {
    match &message.content {
        Ok(body) => render_body(body),
        Err(DecryptFailure::Unreadable) => DecryptFailure::Unreadable.to_string(),
        Err(failure) => format!("[unreadable: {}]", failure),
    }
}

fn render_body(body: &Body) -> String {
    match body {
        Body::Message { text } => text.clone(),
        Body::File {
            filename,
            file_type,
            data,
        } => format!("[file {} ({}, {} bytes)]", filename, file_type, data.len()),
        Body::Audio { mime, data } => format!("[voice message ({}, {} bytes)]", mime, data.len()),
        Body::Typing { .. } | Body::ReadReceipt => String::new(),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::{EnvelopeKind, MessageId, Timestamp};

    fn inbound(content: std::result::Result<Body, DecryptFailure>) -> AppEvent {
        AppEvent::MessageReceived {
            message: InboundMessage {
                message_id: Some(MessageId::new(1)),
                kind: EnvelopeKind::Message,
                created_at: Timestamp::new(0),
                content,
            },
        }
    }

    #[test]
    fn test_undecryptable_message_renders_placeholder() {
        let line = render(&inbound(Err(DecryptFailure::Unreadable))).unwrap();
        assert_eq!(line, "friend: Couldn't decrypt (wrong password?)");
    }

    #[test]
    fn test_text_renders_plainly() {
        let line = render(&inbound(Ok(Body::text("hello")))).unwrap();
        assert_eq!(line, "friend: hello");
    }

    #[test]
    fn test_bookkeeping_events_are_silent() {
        assert!(render(&AppEvent::TypingChanged { typing: false }).is_none());
        assert!(render(&AppEvent::PendingStateChanged {
            message_id: MessageId::new(1),
            kind: EnvelopeKind::Message,
            stage: PendingStage::Committed,
        })
        .is_none());
    }
}
