//! In-memory loopback transport
//!
//! A [`LoopbackNetwork`] plays the role of the signaling server and the data
//! channels between peers living in one process. Each runtime gets its own
//! [`LoopbackTransport`], which turns the core's effects into events for the
//! counterpart peer.
//!
//! Every transport owns an unbounded inbox that a forwarder task drains into
//! its runtime's event channel. Deliveries only ever push into an inbox, so
//! a transport never waits on a peer whose runtime is busy. An open link
//! remembers both inboxes and keeps working without the signaling table.
//!
//! Behaviour worth knowing when writing scenarios:
//! - `Refuse` drops the connection silently, so the initiator only learns
//!   about it from its own connect timeout.
//! - `Connect` to an unregistered id yields an `Error` event for that handle.
//! - Identities can be reserved up front to provoke `IdentityUnavailable`.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use peerchat_core::channel::{EffectReceiver, EventSender};
use peerchat_core::{
    ChatError, ChatResult, ConnectionHandle, ConnectionMetadata, Effect, Event, MessageId, PeerId,
    TransportTask,
};

/// Queue of events bound for one runtime
type Inbox = mpsc::UnboundedSender<Event>;

// ----------------------------------------------------------------------------
// Loopback Network
// ----------------------------------------------------------------------------

/// One side of a loopback connection
#[derive(Debug, Clone)]
struct Link {
    counterpart: ConnectionHandle,
    /// Inbox of the runtime that owns this side
    inbox: Inbox,
}

#[derive(Debug, Default)]
struct NetworkState {
    /// Registered identities; `None` marks an id reserved by a test
    peers: HashMap<PeerId, Option<Inbox>>,
    links: HashMap<ConnectionHandle, Link>,
}

impl NetworkState {
    fn inbox_for(&self, peer: &PeerId) -> Option<Inbox> {
        self.peers.get(peer).cloned().flatten()
    }

    /// The inbox serving the far side of `handle`
    fn counterpart_of(&self, handle: &ConnectionHandle) -> Option<(ConnectionHandle, Inbox)> {
        let link = self.links.get(handle)?;
        let remote = self.links.get(&link.counterpart)?;
        Some((link.counterpart, remote.inbox.clone()))
    }

    fn remove_link_pair(&mut self, handle: &ConnectionHandle) -> Option<(Link, Link)> {
        let local = self.links.remove(handle)?;
        let remote = self.links.remove(&local.counterpart)?;
        Some((local, remote))
    }
}

/// Events to deliver once the network lock has been released
type Deliveries = Vec<(Inbox, Event)>;

/// Shared in-process signaling server and connection table
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport attached to this network
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport::new(self.clone())
    }

    /// Occupy `peer_id` so that a later `Listen` for it fails
    pub async fn reserve_id(&self, peer_id: PeerId) {
        self.state.lock().await.peers.insert(peer_id, None);
    }

    pub async fn release_id(&self, peer_id: &PeerId) {
        let mut state = self.state.lock().await;
        if matches!(state.peers.get(peer_id), Some(None)) {
            state.peers.remove(peer_id);
        }
    }

    pub async fn is_registered(&self, peer_id: &PeerId) -> bool {
        self.state.lock().await.inbox_for(peer_id).is_some()
    }

    /// Simulate the signaling link of `peer_id` dropping. Open connections
    /// are left alone, as with a real signaling outage.
    pub async fn drop_signaling(&self, peer_id: &PeerId) -> bool {
        let inbox = {
            let mut state = self.state.lock().await;
            state.peers.remove(peer_id).flatten()
        };
        match inbox {
            Some(inbox) => {
                info!(peer = %peer_id, "Loopback signaling dropped");
                inbox.send(Event::Disconnected).is_ok()
            }
            None => false,
        }
    }

    /// Number of live connection endpoints
    pub async fn link_count(&self) -> usize {
        self.state.lock().await.links.len()
    }

    async fn register(&self, peer_id: &PeerId, inbox: &Inbox) -> Deliveries {
        let mut state = self.state.lock().await;
        let taken = match state.peers.get(peer_id) {
            Some(Some(existing)) => !existing.same_channel(inbox),
            Some(None) => true,
            None => false,
        };
        if taken {
            warn!(peer = %peer_id, "Loopback identity already registered");
            return vec![(
                inbox.clone(),
                Event::IdentityUnavailable {
                    local_id: peer_id.clone(),
                },
            )];
        }
        state.peers.insert(peer_id.clone(), Some(inbox.clone()));
        debug!(peer = %peer_id, "Loopback identity registered");
        vec![(
            inbox.clone(),
            Event::Listening {
                local_id: peer_id.clone(),
            },
        )]
    }

    async fn unregister(&self, peer_id: &PeerId, inbox: &Inbox) {
        let mut state = self.state.lock().await;
        if let Some(Some(existing)) = state.peers.get(peer_id) {
            if existing.same_channel(inbox) {
                state.peers.remove(peer_id);
            }
        }
    }

    async fn connect(
        &self,
        from: &PeerId,
        inbox: &Inbox,
        handle: ConnectionHandle,
        remote: PeerId,
        metadata: ConnectionMetadata,
    ) -> Deliveries {
        let mut state = self.state.lock().await;
        let Some(remote_inbox) = state.inbox_for(&remote) else {
            return vec![(
                inbox.clone(),
                Event::Error {
                    handle: Some(handle),
                    error: format!("Could not connect to peer {}", remote),
                },
            )];
        };

        let counterpart = ConnectionHandle::new();
        state.links.insert(
            handle,
            Link {
                counterpart,
                inbox: inbox.clone(),
            },
        );
        state.links.insert(
            counterpart,
            Link {
                counterpart: handle,
                inbox: remote_inbox.clone(),
            },
        );
        vec![(
            remote_inbox,
            Event::Inbound {
                handle: counterpart,
                remote: from.clone(),
                metadata,
            },
        )]
    }

    async fn accept(&self, handle: ConnectionHandle) -> Deliveries {
        let state = self.state.lock().await;
        match state.counterpart_of(&handle) {
            Some((initiator_handle, initiator)) => vec![(
                initiator,
                Event::Opened {
                    handle: initiator_handle,
                },
            )],
            None => Vec::new(),
        }
    }

    async fn refuse(&self, handle: ConnectionHandle) {
        self.state.lock().await.remove_link_pair(&handle);
    }

    async fn send(
        &self,
        inbox: &Inbox,
        handle: ConnectionHandle,
        message_id: Option<MessageId>,
        data: Vec<u8>,
    ) -> Deliveries {
        let target = self.state.lock().await.counterpart_of(&handle);

        let mut deliveries = Vec::with_capacity(2);
        match target {
            Some((counterpart, remote_inbox)) => {
                deliveries.push((
                    remote_inbox,
                    Event::Data {
                        handle: counterpart,
                        data,
                    },
                ));
                if let Some(message_id) = message_id {
                    deliveries.push((inbox.clone(), Event::SendComplete { handle, message_id }));
                }
            }
            None => {
                if let Some(message_id) = message_id {
                    deliveries.push((
                        inbox.clone(),
                        Event::SendFailed {
                            handle,
                            message_id,
                            error: "Connection is not open".to_string(),
                        },
                    ));
                }
            }
        }
        deliveries
    }

    async fn close(&self, handle: ConnectionHandle) -> Deliveries {
        let mut state = self.state.lock().await;
        match state.remove_link_pair(&handle) {
            Some((local, remote)) => vec![(
                remote.inbox,
                Event::Closed {
                    handle: local.counterpart,
                },
            )],
            None => Vec::new(),
        }
    }
}

// ----------------------------------------------------------------------------
// Loopback Transport
// ----------------------------------------------------------------------------

/// Transport task backed by a [`LoopbackNetwork`]
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    local_id: Option<PeerId>,
    event_sender: Option<EventSender>,
    effect_receiver: Option<EffectReceiver>,
}

impl LoopbackTransport {
    pub fn new(network: LoopbackNetwork) -> Self {
        Self {
            network,
            local_id: None,
            event_sender: None,
            effect_receiver: None,
        }
    }

    fn local_id(&self) -> ChatResult<PeerId> {
        self.local_id
            .clone()
            .ok_or_else(|| ChatError::config_error("Loopback transport is not listening"))
    }

    async fn apply(&mut self, effect: Effect, inbox: &Inbox) -> ChatResult<()> {
        let deliveries = match effect {
            Effect::Listen { local_id } => {
                if let Some(previous) = self.local_id.replace(local_id.clone()) {
                    if previous != local_id {
                        self.network.unregister(&previous, inbox).await;
                    }
                }
                self.network.register(&local_id, inbox).await
            }
            Effect::Reconnect => {
                let local_id = self.local_id()?;
                self.network.register(&local_id, inbox).await
            }
            Effect::Connect {
                handle,
                remote,
                metadata,
            } => {
                let local_id = self.local_id()?;
                self.network
                    .connect(&local_id, inbox, handle, remote, metadata)
                    .await
            }
            Effect::Accept { handle } => self.network.accept(handle).await,
            Effect::Refuse { handle, reason } => {
                debug!(%handle, ?reason, "Refusing loopback connection");
                self.network.refuse(handle).await;
                Vec::new()
            }
            Effect::Send {
                handle,
                message_id,
                data,
            } => self.network.send(inbox, handle, message_id, data).await,
            Effect::Close { handle } => self.network.close(handle).await,
        };

        for (target, event) in deliveries {
            if target.send(event).is_err() {
                debug!("Loopback peer inbox closed, dropping event");
            }
        }
        Ok(())
    }
}

/// Move inbox events into the runtime's bounded event channel, in order
fn spawn_forwarder(sender: EventSender) -> (Inbox, JoinHandle<()>) {
    let (inbox, mut queued) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = queued.recv().await {
            if sender.send(event).await.is_err() {
                debug!("Runtime event channel closed, stopping loopback forwarder");
                break;
            }
        }
    });
    (inbox, forwarder)
}

#[async_trait::async_trait]
impl TransportTask for LoopbackTransport {
    fn attach_channels(
        &mut self,
        event_sender: EventSender,
        effect_receiver: EffectReceiver,
    ) -> ChatResult<()> {
        if self.event_sender.is_some() || self.effect_receiver.is_some() {
            return Err(ChatError::config_error(
                "Loopback transport channels already attached",
            ));
        }
        self.event_sender = Some(event_sender);
        self.effect_receiver = Some(effect_receiver);
        Ok(())
    }

    async fn run(&mut self) -> ChatResult<()> {
        let sender = self
            .event_sender
            .clone()
            .ok_or_else(|| ChatError::config_error("Loopback transport has no event channel"))?;
        let mut effects = self
            .effect_receiver
            .take()
            .ok_or_else(|| ChatError::config_error("Loopback transport has no effect channel"))?;
        let (inbox, forwarder) = spawn_forwarder(sender);

        info!("Loopback transport starting");
        let mut result = Ok(());
        while let Some(effect) = effects.recv().await {
            if let Err(e) = self.apply(effect, &inbox).await {
                result = Err(e);
                break;
            }
        }

        if let Some(local_id) = self.local_id.take() {
            self.network.unregister(&local_id, &inbox).await;
        }
        forwarder.abort();
        info!("Loopback transport stopped");
        result
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::channel::{create_effect_channel, create_event_channel, EffectSender};
    use peerchat_core::{ChannelConfig, RefuseReason};
    use tokio::sync::mpsc;

    struct Endpoint {
        effects: EffectSender,
        events: mpsc::Receiver<Event>,
    }

    fn spawn_endpoint(network: &LoopbackNetwork) -> Endpoint {
        let config = ChannelConfig::testing();
        let (event_sender, events) = create_event_channel(&config);
        let (effects, effect_receiver) = create_effect_channel(&config);
        let mut transport = network.transport();
        transport
            .attach_channels(event_sender, effect_receiver)
            .unwrap();
        tokio::spawn(async move { transport.run().await });
        Endpoint { effects, events }
    }

    async fn listen(endpoint: &mut Endpoint, id: &str) -> Event {
        endpoint
            .effects
            .send(Effect::Listen {
                local_id: PeerId::new(id),
            })
            .await
            .unwrap();
        endpoint.events.recv().await.unwrap()
    }

    #[tokio::test]
    async fn test_listen_and_identity_collision() {
        let network = LoopbackNetwork::new();
        let mut alice = spawn_endpoint(&network);
        let mut imposter = spawn_endpoint(&network);

        assert!(matches!(listen(&mut alice, "alice").await, Event::Listening { .. }));
        assert!(matches!(
            listen(&mut imposter, "alice").await,
            Event::IdentityUnavailable { .. }
        ));

        network.reserve_id(PeerId::new("bob")).await;
        assert!(matches!(
            listen(&mut imposter, "bob").await,
            Event::IdentityUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_accept_send_close() {
        let network = LoopbackNetwork::new();
        let mut alice = spawn_endpoint(&network);
        let mut bob = spawn_endpoint(&network);
        listen(&mut alice, "alice").await;
        listen(&mut bob, "bob").await;

        let handle = ConnectionHandle::new();
        alice
            .effects
            .send(Effect::Connect {
                handle,
                remote: PeerId::new("bob"),
                metadata: ConnectionMetadata::with_password("pw"),
            })
            .await
            .unwrap();

        let Event::Inbound {
            handle: inbound,
            remote,
            metadata,
        } = bob.events.recv().await.unwrap()
        else {
            panic!("expected inbound connection");
        };
        assert_eq!(remote, PeerId::new("alice"));
        assert_eq!(metadata.password.as_deref(), Some("pw"));

        bob.effects.send(Effect::Accept { handle: inbound }).await.unwrap();
        assert!(matches!(alice.events.recv().await.unwrap(), Event::Opened { handle: h } if h == handle));

        alice
            .effects
            .send(Effect::Send {
                handle,
                message_id: Some(MessageId::new(7)),
                data: b"hi".to_vec(),
            })
            .await
            .unwrap();
        assert!(matches!(
            bob.events.recv().await.unwrap(),
            Event::Data { handle: h, data } if h == inbound && data == b"hi"
        ));
        assert!(matches!(
            alice.events.recv().await.unwrap(),
            Event::SendComplete { message_id, .. } if message_id == MessageId::new(7)
        ));

        alice.effects.send(Effect::Close { handle }).await.unwrap();
        assert!(matches!(bob.events.recv().await.unwrap(), Event::Closed { handle: h } if h == inbound));
        assert_eq!(network.link_count().await, 0);
    }

    #[tokio::test]
    async fn test_connect_to_unknown_peer_reports_error() {
        let network = LoopbackNetwork::new();
        let mut alice = spawn_endpoint(&network);
        listen(&mut alice, "alice").await;

        let handle = ConnectionHandle::new();
        alice
            .effects
            .send(Effect::Connect {
                handle,
                remote: PeerId::new("nobody"),
                metadata: ConnectionMetadata::default(),
            })
            .await
            .unwrap();

        assert!(matches!(
            alice.events.recv().await.unwrap(),
            Event::Error { handle: Some(h), .. } if h == handle
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_is_silent_and_unlinked() {
        let network = LoopbackNetwork::new();
        let mut alice = spawn_endpoint(&network);
        let mut bob = spawn_endpoint(&network);
        listen(&mut alice, "alice").await;
        listen(&mut bob, "bob").await;

        let handle = ConnectionHandle::new();
        alice
            .effects
            .send(Effect::Connect {
                handle,
                remote: PeerId::new("bob"),
                metadata: ConnectionMetadata::with_password("wrong"),
            })
            .await
            .unwrap();
        let Event::Inbound { handle: inbound, .. } = bob.events.recv().await.unwrap() else {
            panic!("expected inbound connection");
        };

        bob.effects
            .send(Effect::Refuse {
                handle: inbound,
                reason: RefuseReason::WrongCredential,
            })
            .await
            .unwrap();
        while network.link_count().await != 0 {
            tokio::task::yield_now().await;
        }

        alice
            .effects
            .send(Effect::Send {
                handle,
                message_id: Some(MessageId::new(1)),
                data: Vec::new(),
            })
            .await
            .unwrap();

        assert!(matches!(
            alice.events.recv().await.unwrap(),
            Event::SendFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_drop_signaling_and_reconnect() {
        let network = LoopbackNetwork::new();
        let mut alice = spawn_endpoint(&network);
        listen(&mut alice, "alice").await;

        assert!(network.drop_signaling(&PeerId::new("alice")).await);
        assert!(matches!(alice.events.recv().await.unwrap(), Event::Disconnected));
        assert!(!network.is_registered(&PeerId::new("alice")).await);

        alice.effects.send(Effect::Reconnect).await.unwrap();
        assert!(matches!(alice.events.recv().await.unwrap(), Event::Listening { .. }));
        assert!(network.is_registered(&PeerId::new("alice")).await);
    }

    #[tokio::test]
    async fn test_open_link_outlives_signaling() {
        let network = LoopbackNetwork::new();
        let mut alice = spawn_endpoint(&network);
        let mut bob = spawn_endpoint(&network);
        listen(&mut alice, "alice").await;
        listen(&mut bob, "bob").await;

        let handle = ConnectionHandle::new();
        alice
            .effects
            .send(Effect::Connect {
                handle,
                remote: PeerId::new("bob"),
                metadata: ConnectionMetadata::default(),
            })
            .await
            .unwrap();
        let Event::Inbound { handle: inbound, .. } = bob.events.recv().await.unwrap() else {
            panic!("expected inbound connection");
        };
        bob.effects.send(Effect::Accept { handle: inbound }).await.unwrap();
        assert!(matches!(alice.events.recv().await.unwrap(), Event::Opened { .. }));

        assert!(network.drop_signaling(&PeerId::new("alice")).await);
        assert!(matches!(alice.events.recv().await.unwrap(), Event::Disconnected));

        bob.effects
            .send(Effect::Send {
                handle: inbound,
                message_id: Some(MessageId::new(3)),
                data: b"still there?".to_vec(),
            })
            .await
            .unwrap();
        assert!(matches!(
            alice.events.recv().await.unwrap(),
            Event::Data { handle: h, data } if h == handle && data == b"still there?"
        ));
        assert!(matches!(
            bob.events.recv().await.unwrap(),
            Event::SendComplete { message_id, .. } if message_id == MessageId::new(3)
        ));

        bob.effects.send(Effect::Close { handle: inbound }).await.unwrap();
        assert!(matches!(alice.events.recv().await.unwrap(), Event::Closed { handle: h } if h == handle));
    }

    #[tokio::test]
    async fn test_delivery_does_not_wait_for_a_busy_peer() {
        let network = LoopbackNetwork::new();
        let config = ChannelConfig {
            event_buffer_size: 1,
            ..ChannelConfig::testing()
        };
        let mut alice = spawn_endpoint(&network);
        let (event_sender, mut bob_events) = create_event_channel(&config);
        let (bob_effects, effect_receiver) = create_effect_channel(&config);
        let mut transport = network.transport();
        transport
            .attach_channels(event_sender, effect_receiver)
            .unwrap();
        tokio::spawn(async move { transport.run().await });

        listen(&mut alice, "alice").await;
        bob_effects
            .send(Effect::Listen {
                local_id: PeerId::new("bob"),
            })
            .await
            .unwrap();
        assert!(matches!(bob_events.recv().await.unwrap(), Event::Listening { .. }));

        let handle = ConnectionHandle::new();
        alice
            .effects
            .send(Effect::Connect {
                handle,
                remote: PeerId::new("bob"),
                metadata: ConnectionMetadata::default(),
            })
            .await
            .unwrap();
        let Event::Inbound { handle: inbound, .. } = bob_events.recv().await.unwrap() else {
            panic!("expected inbound connection");
        };
        bob_effects.send(Effect::Accept { handle: inbound }).await.unwrap();
        assert!(matches!(alice.events.recv().await.unwrap(), Event::Opened { .. }));

        // Bob reads nothing while Alice floods; her completions still arrive.
        for id in 1..=50 {
            alice
                .effects
                .send(Effect::Send {
                    handle,
                    message_id: Some(MessageId::new(id)),
                    data: vec![id as u8],
                })
                .await
                .unwrap();
        }
        for id in 1..=50 {
            assert!(matches!(
                alice.events.recv().await.unwrap(),
                Event::SendComplete { message_id, .. } if message_id == MessageId::new(id)
            ));
        }
        for id in 1..=50u64 {
            assert!(matches!(
                bob_events.recv().await.unwrap(),
                Event::Data { data, .. } if data == vec![id as u8]
            ));
        }
    }
}
