//! Runtime Builder API
//!
//! Provides a builder-style API for consumers (CLI, tests) to attach a
//! transport and get command and app-event handles to a running peer.

use peerchat_core::channel::{
    create_app_event_channel, create_command_channel, create_effect_channel,
    create_event_channel, AppEventReceiver, CommandSender, EffectReceiver, EventSender,
};
use peerchat_core::{ChatConfig, ChatError, ChatResult, Command, PeerId, SessionContext, TransportTask};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::logic::CoreLogicTask;

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for one PeerChat peer
pub struct RuntimeBuilder {
    context: SessionContext,
    config: ChatConfig,
    transport: Option<Box<dyn TransportTask>>,
}

impl RuntimeBuilder {
    /// Create a new runtime builder
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            config: ChatConfig::default(),
            transport: None,
        }
    }

    /// Set the chat configuration
    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach the transport task. Without one, effects are left for the
    /// caller to drain via [`RuntimeHandle::take_effect_receiver`].
    pub fn with_transport(mut self, transport: Box<dyn TransportTask>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build and start the runtime
    pub async fn build_and_start(self) -> ChatResult<RuntimeHandle> {
        self.config.validate()?;
        let local_id = self.context.local_id.clone();
        info!(peer = %local_id, "Building PeerChat runtime");

        let channel_config = &self.config.channels;
        let (command_sender, command_receiver) = create_command_channel(channel_config);
        let (event_sender, event_receiver) = create_event_channel(channel_config);
        let (effect_sender, effect_receiver) = create_effect_channel(channel_config);
        let (app_event_sender, app_event_receiver) = create_app_event_channel(channel_config);

        let mut core = CoreLogicTask::new(
            self.context,
            &self.config,
            command_receiver,
            event_receiver,
            effect_sender,
            app_event_sender,
        )?;

        let (transport_handle, effect_receiver) = match self.transport {
            Some(mut transport) => {
                transport.attach_channels(event_sender.clone(), effect_receiver)?;
                info!(transport = transport.name(), "Starting transport task");
                let handle = tokio::spawn(async move { transport.run().await });
                (Some(handle), None)
            }
            None => (None, Some(effect_receiver)),
        };

        let core_handle = tokio::spawn(async move { core.run().await });

        info!(peer = %local_id, "PeerChat runtime started");

        Ok(RuntimeHandle {
            local_id,
            command_sender,
            event_sender,
            app_event_receiver: Some(app_event_receiver),
            effect_receiver,
            core_handle: Some(core_handle),
            transport_handle,
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running PeerChat peer
pub struct RuntimeHandle {
    local_id: PeerId,
    command_sender: CommandSender,
    event_sender: EventSender,
    app_event_receiver: Option<AppEventReceiver>,
    effect_receiver: Option<EffectReceiver>,
    core_handle: Option<JoinHandle<ChatResult<()>>>,
    transport_handle: Option<JoinHandle<ChatResult<()>>>,
}

impl RuntimeHandle {
    /// Identity the runtime was started with. A collision may replace it;
    /// watch for `AppEvent::IdentityAssigned`.
    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Get a command sender for sending commands to the runtime
    pub fn command_sender(&self) -> CommandSender {
        self.command_sender.clone()
    }

    /// Sender for injecting transport events directly
    pub fn event_sender(&self) -> EventSender {
        self.event_sender.clone()
    }

    /// Take the app event receiver (can only be called once)
    pub fn take_app_event_receiver(&mut self) -> Option<AppEventReceiver> {
        self.app_event_receiver.take()
    }

    /// Take the effect receiver when no transport was attached
    pub fn take_effect_receiver(&mut self) -> Option<EffectReceiver> {
        self.effect_receiver.take()
    }

    /// Send a command to the runtime
    pub async fn send_command(&self, command: Command) -> ChatResult<()> {
        self.command_sender
            .send(command)
            .await
            .map_err(|_| ChatError::channel_error("Failed to send command to runtime"))
    }

    /// Check if the core logic task is still running
    pub fn is_running(&self) -> bool {
        self.core_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the core logic task to complete
    pub async fn wait(&mut self) -> ChatResult<()> {
        match self.core_handle.take() {
            Some(handle) => handle.await.map_err(|e| {
                ChatError::channel_error(format!("Core logic task panicked: {}", e))
            })?,
            None => Ok(()),
        }
    }

    /// Close the session, stop the core and let the transport drain
    pub async fn shutdown(&mut self) -> ChatResult<()> {
        if self.send_command(Command::Shutdown).await.is_err() {
            warn!("Runtime already stopped");
        }
        self.wait().await?;

        if let Some(handle) = self.transport_handle.take() {
            match handle.await {
                Ok(result) => result?,
                Err(e) => {
                    return Err(ChatError::channel_error(format!(
                        "Transport task panicked: {}",
                        e
                    )))
                }
            }
        }
        info!(peer = %self.local_id, "PeerChat runtime shut down");
        Ok(())
    }
}
